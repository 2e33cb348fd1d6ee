use crate::{
    auth::AuthUser,
    axum_http::error_responses::error_response,
    config::config_model::DotEnvyConfig,
};
use application::{
    interfaces::{separation_engine::SeparationEngineClient, storage::StemStorageClient},
    usercases::{
        entitlements::EntitlementValidator,
        separation_job::SeparationJobUseCase,
        usage_tracking::UsageRecorder,
    },
};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use domain::{
    repositories::{
        audio_file::AudioFileRepository, credit_ledger::CreditLedgerRepository,
        separation_job::SeparationJobRepository, usage_stats::UsageStatsRepository,
        user_account::UserAccountRepository,
    },
    value_objects::separation_jobs::CreateSeparationJobModel,
};
use infra::{
    engines::sieve::{SieveEngineClient, SieveEngineConfig},
    postgres::{
        postgres_connection::PgPoolSquad,
        repositories::{
            audio_file::AudioFilePostgres, credit_ledger::CreditLedgerPostgres,
            separation_job::SeparationJobPostgres, usage_stats::UsageStatsPostgres,
            user_account::UserAccountPostgres,
        },
    },
    storages::supabase_storage::{SupabaseStorageClient, SupabaseStorageConfig},
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub async fn routes(
    db_pool: Arc<PgPoolSquad>,
    config: Arc<DotEnvyConfig>,
) -> anyhow::Result<Router> {
    let job_repository = SeparationJobPostgres::new(Arc::clone(&db_pool));
    let ledger_repository = CreditLedgerPostgres::new(Arc::clone(&db_pool));
    let audio_file_repository = AudioFilePostgres::new(Arc::clone(&db_pool));
    let account_repository = Arc::new(UserAccountPostgres::new(Arc::clone(&db_pool)));
    let usage_repository = Arc::new(UsageStatsPostgres::new(Arc::clone(&db_pool)));

    let engine_client = SieveEngineClient::new(SieveEngineConfig {
        base_url: config.engine.base_url.clone(),
        api_key: config.engine.api_key.clone(),
        request_timeout_secs: config.engine.timeout_secs,
    })?;
    let storage_client = SupabaseStorageClient::new(SupabaseStorageConfig {
        endpoint: config.supabase.s3_endpoint.clone(),
        region: config.supabase.s3_region.clone(),
        bucket: config.supabase.audio_bucket.clone(),
        access_key: config.supabase.s3_access_key.clone(),
        secret_key: config.supabase.s3_secret_key.clone(),
    })
    .await?;

    let validator = EntitlementValidator::new(
        Arc::clone(&account_repository),
        Arc::clone(&usage_repository),
    );
    let usage_recorder = UsageRecorder::new(Arc::clone(&usage_repository));

    let usecase = SeparationJobUseCase::new(
        Arc::new(job_repository),
        Arc::new(ledger_repository),
        Arc::new(audio_file_repository),
        Arc::new(engine_client),
        Arc::new(storage_client),
        Arc::new(validator),
        Arc::new(usage_recorder),
        config.supabase.audio_bucket.clone(),
    );

    Ok(Router::new()
        .route("/", post(create_separation).get(list_separations))
        .route(
            "/:job_id",
            get(separation_status).delete(delete_separation),
        )
        .with_state(Arc::new(usecase)))
}

pub async fn create_separation<J, L, A, U, F, E, S>(
    State(usecase): State<Arc<SeparationJobUseCase<J, L, A, U, F, E, S>>>,
    AuthUser { user_id, .. }: AuthUser,
    Json(create_separation_model): Json<CreateSeparationJobModel>,
) -> impl IntoResponse
where
    J: SeparationJobRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    A: UserAccountRepository + Send + Sync + 'static,
    U: UsageStatsRepository + Send + Sync + 'static,
    F: AudioFileRepository + Send + Sync + 'static,
    E: SeparationEngineClient + Send + Sync + 'static,
    S: StemStorageClient + Send + Sync + 'static,
{
    info!(%user_id, "separations: create request received");
    match usecase.create_job(user_id, create_separation_model).await {
        Ok(job) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(err) => {
            error!(%user_id, error = ?err, "separations: failed to create job");
            error_response(err.status_code(), err.client_message())
        }
    }
}

pub async fn list_separations<J, L, A, U, F, E, S>(
    State(usecase): State<Arc<SeparationJobUseCase<J, L, A, U, F, E, S>>>,
    AuthUser { user_id, .. }: AuthUser,
) -> impl IntoResponse
where
    J: SeparationJobRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    A: UserAccountRepository + Send + Sync + 'static,
    U: UsageStatsRepository + Send + Sync + 'static,
    F: AudioFileRepository + Send + Sync + 'static,
    E: SeparationEngineClient + Send + Sync + 'static,
    S: StemStorageClient + Send + Sync + 'static,
{
    info!(%user_id, "separations: list request received");
    match usecase.list_jobs(user_id).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => {
            error!(%user_id, error = ?err, "separations: failed to list jobs");
            error_response(err.status_code(), err.client_message())
        }
    }
}

pub async fn separation_status<J, L, A, U, F, E, S>(
    State(usecase): State<Arc<SeparationJobUseCase<J, L, A, U, F, E, S>>>,
    AuthUser { user_id, .. }: AuthUser,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse
where
    J: SeparationJobRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    A: UserAccountRepository + Send + Sync + 'static,
    U: UsageStatsRepository + Send + Sync + 'static,
    F: AudioFileRepository + Send + Sync + 'static,
    E: SeparationEngineClient + Send + Sync + 'static,
    S: StemStorageClient + Send + Sync + 'static,
{
    info!(%user_id, %job_id, "separations: status request received");
    match usecase.get_job_status(user_id, job_id).await {
        Ok(job) => Json(job).into_response(),
        Err(err) => {
            error!(%user_id, %job_id, error = ?err, "separations: failed to check job status");
            error_response(err.status_code(), err.client_message())
        }
    }
}

pub async fn delete_separation<J, L, A, U, F, E, S>(
    State(usecase): State<Arc<SeparationJobUseCase<J, L, A, U, F, E, S>>>,
    AuthUser { user_id, .. }: AuthUser,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse
where
    J: SeparationJobRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    A: UserAccountRepository + Send + Sync + 'static,
    U: UsageStatsRepository + Send + Sync + 'static,
    F: AudioFileRepository + Send + Sync + 'static,
    E: SeparationEngineClient + Send + Sync + 'static,
    S: StemStorageClient + Send + Sync + 'static,
{
    info!(%user_id, %job_id, "separations: delete request received");
    match usecase.delete_job(user_id, job_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!(%user_id, %job_id, error = ?err, "separations: failed to delete job");
            error_response(err.status_code(), err.client_message())
        }
    }
}
