use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::usage_stats::UsageStatsEntity;

#[async_trait]
#[automock]
pub trait UsageStatsRepository {
    /// Upsert-increments the month's aggregate by `minutes` and one
    /// separation, in a single statement.
    async fn increment(&self, user_id: Uuid, period_month: &str, minutes: f64) -> Result<()>;

    async fn find(&self, user_id: Uuid, period_month: &str) -> Result<Option<UsageStatsEntity>>;
}
