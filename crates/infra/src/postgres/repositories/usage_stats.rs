use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{insert_into, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::usage_stats::{InsertUsageStatsEntity, UsageStatsEntity},
    repositories::usage_stats::UsageStatsRepository,
    schema::usage_stats,
};

pub struct UsageStatsPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UsageStatsPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UsageStatsRepository for UsageStatsPostgres {
    async fn increment(&self, user_id: Uuid, period_month: &str, minutes: f64) -> Result<()> {
        // Diesel is synchronous; run DB work on the blocking threadpool.
        let db_pool = Arc::clone(&self.db_pool);
        let period_month = period_month.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db_pool.get()?;
            let now = Utc::now();

            let insert_entity = InsertUsageStatsEntity {
                user_id,
                period_month,
                minutes_processed: minutes,
                separations_performed: 1,
                updated_at: now,
            };

            // Single-statement upsert so concurrent increments never lose
            // an update.
            insert_into(usage_stats::table)
                .values(&insert_entity)
                .on_conflict((usage_stats::user_id, usage_stats::period_month))
                .do_update()
                .set((
                    usage_stats::minutes_processed.eq(usage_stats::minutes_processed + minutes),
                    usage_stats::separations_performed
                        .eq(usage_stats::separations_performed + 1),
                    usage_stats::updated_at.eq(now),
                ))
                .execute(&mut conn)?;

            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn find(&self, user_id: Uuid, period_month: &str) -> Result<Option<UsageStatsEntity>> {
        let db_pool = Arc::clone(&self.db_pool);
        let period_month = period_month.to_string();

        Ok(
            task::spawn_blocking(move || -> Result<Option<UsageStatsEntity>> {
                let mut conn = db_pool.get()?;

                let result = usage_stats::table
                    .filter(usage_stats::user_id.eq(user_id))
                    .filter(usage_stats::period_month.eq(period_month))
                    .select(UsageStatsEntity::as_select())
                    .first::<UsageStatsEntity>(&mut conn)
                    .optional()?;

                Ok(result)
            })
            .await??,
        )
    }
}
