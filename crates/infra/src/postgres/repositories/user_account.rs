use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::{
        credit_transactions::InsertCreditTransactionEntity,
        user_accounts::{InsertUserAccountEntity, UserAccountEntity},
    },
    repositories::user_account::UserAccountRepository,
    schema::{credit_transactions, user_accounts},
    value_objects::enums::subscription_tiers::SubscriptionTier,
};

pub struct UserAccountPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserAccountPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserAccountRepository for UserAccountPostgres {
    async fn insert(&self, insert_entity: InsertUserAccountEntity) -> Result<UserAccountEntity> {
        // Diesel is synchronous; run DB work on the blocking threadpool.
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<UserAccountEntity> {
            let mut conn = db_pool.get()?;

            let result = insert_into(user_accounts::table)
                .values(&insert_entity)
                .returning(UserAccountEntity::as_select())
                .get_result::<UserAccountEntity>(&mut conn)?;

            Ok(result)
        })
        .await??)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserAccountEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(
            task::spawn_blocking(move || -> Result<Option<UserAccountEntity>> {
                let mut conn = db_pool.get()?;

                let result = user_accounts::table
                    .find(user_id)
                    .select(UserAccountEntity::as_select())
                    .first::<UserAccountEntity>(&mut conn)
                    .optional()?;

                Ok(result)
            })
            .await??,
        )
    }

    async fn change_tier(
        &self,
        user_id: Uuid,
        tier: SubscriptionTier,
    ) -> Result<UserAccountEntity> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<UserAccountEntity> {
            let mut conn = db_pool.get()?;
            let monthly_credits = tier.features().monthly_credits;

            // The counter reset and its audit row land together or not at all.
            let result = conn.transaction::<UserAccountEntity, diesel::result::Error, _>(|tx| {
                let account = update(user_accounts::table.find(user_id))
                    .set((
                        user_accounts::subscription_tier.eq(tier.to_string()),
                        user_accounts::credits_total.eq(monthly_credits),
                        user_accounts::credits_remaining.eq(monthly_credits),
                        user_accounts::updated_at.eq(Utc::now()),
                    ))
                    .returning(UserAccountEntity::as_select())
                    .get_result::<UserAccountEntity>(tx)?;

                insert_into(credit_transactions::table)
                    .values(&InsertCreditTransactionEntity {
                        user_id,
                        amount: monthly_credits,
                        job_id: None,
                        description: format!("tier changed to {}", tier),
                        created_at: Utc::now(),
                    })
                    .execute(tx)?;

                Ok(account)
            })?;

            Ok(result)
        })
        .await??)
    }
}
