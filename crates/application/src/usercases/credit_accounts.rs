use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::{
    entities::{
        credit_transactions::CreditTransactionEntity,
        user_accounts::{InsertUserAccountEntity, UserAccountEntity},
    },
    repositories::{credit_ledger::CreditLedgerRepository, user_account::UserAccountRepository},
    value_objects::enums::subscription_tiers::SubscriptionTier,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CreditBalanceDto {
    pub user_id: Uuid,
    pub tier: String,
    pub credits_total: f64,
    pub credits_remaining: f64,
}

impl From<UserAccountEntity> for CreditBalanceDto {
    fn from(entity: UserAccountEntity) -> Self {
        Self {
            user_id: entity.id,
            tier: entity.subscription_tier,
            credits_total: entity.credits_total,
            credits_remaining: entity.credits_remaining,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditTransactionDto {
    pub id: Uuid,
    pub amount: f64,
    pub job_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<CreditTransactionEntity> for CreditTransactionDto {
    fn from(entity: CreditTransactionEntity) -> Self {
        Self {
            id: entity.id,
            amount: entity.amount,
            job_id: entity.job_id,
            description: entity.description,
            created_at: entity.created_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum CreditAccountError {
    #[error("account not found")]
    AccountNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CreditAccountError {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            CreditAccountError::AccountNotFound => StatusCode::NOT_FOUND,
            CreditAccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to the caller. Server-side failures collapse
    /// to a generic line; the detail stays in the logs.
    pub fn client_message(&self) -> String {
        if self.status_code().is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

pub type AccountResult<T> = std::result::Result<T, CreditAccountError>;

/// Account surface: balance reads, ledger history, tier switches. Signup
/// itself happens in the auth system; the account row materializes here on
/// the first balance read and is funded through the ledger's signup grant,
/// so the grant shows up in the transaction history.
pub struct CreditAccountUseCase<A, L>
where
    A: UserAccountRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
{
    account_repo: Arc<A>,
    ledger_repo: Arc<L>,
}

impl<A, L> CreditAccountUseCase<A, L>
where
    A: UserAccountRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
{
    pub fn new(account_repo: Arc<A>, ledger_repo: Arc<L>) -> Self {
        Self {
            account_repo,
            ledger_repo,
        }
    }

    pub async fn balance(&self, user_id: Uuid) -> AccountResult<CreditBalanceDto> {
        if let Some(account) = self.account_repo.find_by_id(user_id).await.map_err(|err| {
            error!(%user_id, db_error = ?err, "credits: failed to load account");
            CreditAccountError::Internal(err)
        })? {
            return Ok(account.into());
        }

        let grant = SubscriptionTier::Free.features().monthly_credits;
        info!(%user_id, grant, "credits: provisioning free account on first read");
        let account = self
            .account_repo
            .insert(InsertUserAccountEntity {
                id: user_id,
                subscription_tier: SubscriptionTier::Free.to_string(),
                credits_total: grant,
                credits_remaining: 0.0,
            })
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "credits: failed to provision account");
                CreditAccountError::Internal(err)
            })?;

        let credits_remaining = self
            .ledger_repo
            .grant(user_id, grant, "signup grant")
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    db_error = ?err,
                    "credits: account provisioned but the signup grant failed, needs reconciliation"
                );
                CreditAccountError::Internal(err)
            })?;

        Ok(CreditBalanceDto {
            credits_remaining,
            ..account.into()
        })
    }

    pub async fn history(&self, user_id: Uuid) -> AccountResult<Vec<CreditTransactionDto>> {
        let transactions = self
            .ledger_repo
            .transactions_for_user(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "credits: failed to load ledger history");
                CreditAccountError::Internal(err)
            })?;

        Ok(transactions
            .into_iter()
            .map(CreditTransactionDto::from)
            .collect())
    }

    pub async fn change_tier(
        &self,
        user_id: Uuid,
        tier: SubscriptionTier,
    ) -> AccountResult<CreditBalanceDto> {
        self.account_repo
            .find_by_id(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "credits: failed to load account for tier change");
                CreditAccountError::Internal(err)
            })?
            .ok_or(CreditAccountError::AccountNotFound)?;

        let account = self
            .account_repo
            .change_tier(user_id, tier)
            .await
            .map_err(|err| {
                error!(%user_id, tier = %tier, db_error = ?err, "credits: failed to change tier");
                CreditAccountError::Internal(err)
            })?;

        info!(
            %user_id,
            tier = %tier,
            credits = account.credits_remaining,
            "credits: tier changed and credits re-initialized"
        );
        Ok(account.into())
    }
}
