use crate::{auth::AuthUser, axum_http::error_responses::error_response};
use application::usercases::credit_accounts::CreditAccountUseCase;
use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, put},
};
use domain::{
    repositories::{
        credit_ledger::CreditLedgerRepository, user_account::UserAccountRepository,
    },
    value_objects::enums::subscription_tiers::SubscriptionTier,
};
use infra::postgres::{
    postgres_connection::PgPoolSquad,
    repositories::{credit_ledger::CreditLedgerPostgres, user_account::UserAccountPostgres},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct ChangeTierRequest {
    pub tier: SubscriptionTier,
}

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let account_repository = UserAccountPostgres::new(Arc::clone(&db_pool));
    let ledger_repository = CreditLedgerPostgres::new(Arc::clone(&db_pool));
    let usecase = CreditAccountUseCase::new(
        Arc::new(account_repository),
        Arc::new(ledger_repository),
    );

    Router::new()
        .route("/balance", get(balance))
        .route("/history", get(history))
        .route("/tier", put(change_tier))
        .with_state(Arc::new(usecase))
}

pub async fn balance<A, L>(
    State(usecase): State<Arc<CreditAccountUseCase<A, L>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    A: UserAccountRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
{
    info!(%user_id, "credits: balance request received");
    match usecase.balance(user_id).await {
        Ok(balance) => Json(balance).into_response(),
        Err(err) => {
            error!(%user_id, error = ?err, "credits: failed to load balance");
            error_response(err.status_code(), err.client_message())
        }
    }
}

pub async fn history<A, L>(
    State(usecase): State<Arc<CreditAccountUseCase<A, L>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    A: UserAccountRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
{
    info!(%user_id, "credits: history request received");
    match usecase.history(user_id).await {
        Ok(history) => Json(history).into_response(),
        Err(err) => {
            error!(%user_id, error = ?err, "credits: failed to load history");
            error_response(err.status_code(), err.client_message())
        }
    }
}

/// Called by the checkout flow once a plan purchase settles.
pub async fn change_tier<A, L>(
    State(usecase): State<Arc<CreditAccountUseCase<A, L>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(change_tier_request): Json<ChangeTierRequest>,
) -> impl IntoResponse
where
    A: UserAccountRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
{
    info!(%user_id, tier = %change_tier_request.tier, "credits: tier change request received");
    match usecase.change_tier(user_id, change_tier_request.tier).await {
        Ok(balance) => Json(balance).into_response(),
        Err(err) => {
            error!(%user_id, error = ?err, "credits: failed to change tier");
            error_response(err.status_code(), err.client_message())
        }
    }
}
