use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::credit_transactions::CreditTransactionEntity;
use crate::value_objects::ledger::DeductionOutcome;

#[async_trait]
#[automock]
pub trait CreditLedgerRepository {
    /// Atomically charges `amount` credits against the user's balance and
    /// records the negative ledger row referencing `job_id`. The balance
    /// re-check and the one-deduction-per-job check happen inside the same
    /// database transaction as the write.
    async fn deduct_for_job(
        &self,
        user_id: Uuid,
        amount: f64,
        job_id: Uuid,
        description: &str,
    ) -> Result<DeductionOutcome>;

    /// Adds credits and records the positive ledger row. Returns the new
    /// balance.
    async fn grant(&self, user_id: Uuid, amount: f64, description: &str) -> Result<f64>;

    async fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<CreditTransactionEntity>>;

    /// Removes all ledger rows referencing the job. Returns the number of
    /// rows removed.
    async fn delete_for_job(&self, job_id: Uuid) -> Result<usize>;
}
