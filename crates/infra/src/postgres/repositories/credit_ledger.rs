use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{delete, insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::{
        credit_transactions::{CreditTransactionEntity, InsertCreditTransactionEntity},
        user_accounts::UserAccountEntity,
    },
    repositories::credit_ledger::CreditLedgerRepository,
    schema::{credit_transactions, user_accounts},
    value_objects::ledger::DeductionOutcome,
};

pub struct CreditLedgerPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl CreditLedgerPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CreditLedgerRepository for CreditLedgerPostgres {
    async fn deduct_for_job(
        &self,
        user_id: Uuid,
        amount: f64,
        job_id: Uuid,
        description: &str,
    ) -> Result<DeductionOutcome> {
        // Diesel is synchronous; run DB work on the blocking threadpool.
        let db_pool = Arc::clone(&self.db_pool);
        let description = description.to_string();

        Ok(task::spawn_blocking(move || -> Result<DeductionOutcome> {
            let mut conn = db_pool.get()?;

            let outcome = conn.transaction::<DeductionOutcome, diesel::result::Error, _>(|tx| {
                // The row lock serializes concurrent charges for the same
                // user; the balance and duplicate checks read committed
                // state under it.
                let account = user_accounts::table
                    .find(user_id)
                    .select(UserAccountEntity::as_select())
                    .for_update()
                    .first::<UserAccountEntity>(tx)?;

                let existing_deductions: i64 = credit_transactions::table
                    .filter(credit_transactions::job_id.eq(Some(job_id)))
                    .filter(credit_transactions::amount.lt(0.0))
                    .count()
                    .get_result::<i64>(tx)?;
                if existing_deductions > 0 {
                    return Ok(DeductionOutcome::DuplicateCharge);
                }

                if account.credits_remaining < amount {
                    return Ok(DeductionOutcome::InsufficientBalance {
                        remaining: account.credits_remaining,
                    });
                }

                let insert_entity = InsertCreditTransactionEntity {
                    user_id,
                    amount: -amount,
                    job_id: Some(job_id),
                    description,
                    created_at: Utc::now(),
                };
                insert_into(credit_transactions::table)
                    .values(&insert_entity)
                    .execute(tx)?;

                let new_balance = update(user_accounts::table.find(user_id))
                    .set((
                        user_accounts::credits_remaining
                            .eq(account.credits_remaining - amount),
                        user_accounts::updated_at.eq(Utc::now()),
                    ))
                    .returning(user_accounts::credits_remaining)
                    .get_result::<f64>(tx)?;

                Ok(DeductionOutcome::Applied { new_balance })
            })?;

            Ok(outcome)
        })
        .await??)
    }

    async fn grant(&self, user_id: Uuid, amount: f64, description: &str) -> Result<f64> {
        let db_pool = Arc::clone(&self.db_pool);
        let description = description.to_string();

        Ok(task::spawn_blocking(move || -> Result<f64> {
            let mut conn = db_pool.get()?;

            let new_balance = conn.transaction::<f64, diesel::result::Error, _>(|tx| {
                let account = user_accounts::table
                    .find(user_id)
                    .select(UserAccountEntity::as_select())
                    .for_update()
                    .first::<UserAccountEntity>(tx)?;

                let insert_entity = InsertCreditTransactionEntity {
                    user_id,
                    amount,
                    job_id: None,
                    description,
                    created_at: Utc::now(),
                };
                insert_into(credit_transactions::table)
                    .values(&insert_entity)
                    .execute(tx)?;

                let new_balance = update(user_accounts::table.find(user_id))
                    .set((
                        user_accounts::credits_remaining
                            .eq(account.credits_remaining + amount),
                        user_accounts::updated_at.eq(Utc::now()),
                    ))
                    .returning(user_accounts::credits_remaining)
                    .get_result::<f64>(tx)?;

                Ok(new_balance)
            })?;

            Ok(new_balance)
        })
        .await??)
    }

    async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<CreditTransactionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(
            task::spawn_blocking(move || -> Result<Vec<CreditTransactionEntity>> {
                let mut conn = db_pool.get()?;

                let results = credit_transactions::table
                    .filter(credit_transactions::user_id.eq(user_id))
                    .select(CreditTransactionEntity::as_select())
                    .order(credit_transactions::created_at.desc())
                    .load::<CreditTransactionEntity>(&mut conn)?;

                Ok(results)
            })
            .await??,
        )
    }

    async fn delete_for_job(&self, job_id: Uuid) -> Result<usize> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db_pool.get()?;

            let rows = delete(credit_transactions::table)
                .filter(credit_transactions::job_id.eq(Some(job_id)))
                .execute(&mut conn)?;

            Ok(rows)
        })
        .await??)
    }
}
