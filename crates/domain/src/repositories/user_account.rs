use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::user_accounts::{InsertUserAccountEntity, UserAccountEntity};
use crate::value_objects::enums::subscription_tiers::SubscriptionTier;

#[async_trait]
#[automock]
pub trait UserAccountRepository {
    async fn insert(&self, insert_entity: InsertUserAccountEntity) -> Result<UserAccountEntity>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserAccountEntity>>;

    /// Switches the tier and re-initializes both credit counters to the new
    /// tier's monthly grant, recording the reset as a positive ledger row.
    async fn change_tier(&self, user_id: Uuid, tier: SubscriptionTier)
    -> Result<UserAccountEntity>;
}
