use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::{
    entities::separation_jobs::{
        InsertSeparationJobEntity, SeparationJobCompletionEntity, SeparationJobEntity,
        SeparationJobFailureEntity,
    },
    repositories::{
        audio_file::AudioFileRepository, credit_ledger::CreditLedgerRepository,
        separation_job::SeparationJobRepository, usage_stats::UsageStatsRepository,
        user_account::UserAccountRepository,
    },
    value_objects::{
        enums::{job_statuses::JobStatus, quality_tiers::QualityTier, stems::StemKind},
        ledger::DeductionOutcome,
        separation_jobs::{CreateSeparationJobModel, ResultFile},
    },
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    interfaces::{
        separation_engine::{
            DispatchOutcome, EngineJobState, SeparationEngineClient, SubmitRequest,
            normalize_output_files,
        },
        storage::{StemStorageClient, object_path_from_url},
    },
    usercases::{
        credit_cost,
        entitlements::{EntitlementValidator, JobRequest, ValidationError},
        usage_tracking::UsageRecorder,
    },
};

const QUEUED_PROGRESS: i32 = 10;
const PROCESSING_PROGRESS: i32 = 50;

#[derive(Debug, Clone, Serialize)]
pub struct SeparationJobDto {
    pub id: Uuid,
    pub audio_file_id: Uuid,
    pub stems: Vec<String>,
    pub quality: String,
    pub status: String,
    pub progress: i32,
    pub result_files: Vec<ResultFile>,
    pub error: Option<String>,
    pub credits_charged: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<SeparationJobEntity> for SeparationJobDto {
    fn from(entity: SeparationJobEntity) -> Self {
        let stems = serde_json::from_value(entity.selected_stems).unwrap_or_default();
        let result_files = entity
            .result_files
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        Self {
            id: entity.id,
            audio_file_id: entity.audio_file_id,
            stems,
            quality: entity.quality,
            status: entity.status,
            progress: entity.progress,
            result_files,
            error: entity.error,
            credits_charged: entity.credits_charged,
            created_at: entity.created_at,
            completed_at: entity.completed_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum SeparationJobError {
    #[error("audio file not found")]
    AudioFileNotFound,
    #[error("job not found")]
    JobNotFound,
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    #[error("completed separation could not be persisted")]
    CompletionNotPersisted,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SeparationJobError {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            SeparationJobError::AudioFileNotFound | SeparationJobError::JobNotFound => {
                StatusCode::NOT_FOUND
            }
            SeparationJobError::Rejected(inner) => inner.status_code(),
            SeparationJobError::CompletionNotPersisted | SeparationJobError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
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

pub type JobResult<T> = std::result::Result<T, SeparationJobError>;

/// Drives a separation job through `pending -> processing -> terminal` and
/// owns every transition. Progress is pull-based: a processing job only
/// advances when somebody asks for its status.
pub struct SeparationJobUseCase<J, L, A, U, F, E, S>
where
    J: SeparationJobRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    A: UserAccountRepository + Send + Sync + 'static,
    U: UsageStatsRepository + Send + Sync + 'static,
    F: AudioFileRepository + Send + Sync + 'static,
    E: SeparationEngineClient + Send + Sync + 'static,
    S: StemStorageClient + Send + Sync + 'static,
{
    job_repo: Arc<J>,
    ledger_repo: Arc<L>,
    audio_file_repo: Arc<F>,
    engine_client: Arc<E>,
    storage_client: Arc<S>,
    validator: Arc<EntitlementValidator<A, U>>,
    usage_recorder: Arc<UsageRecorder<U>>,
    storage_bucket: String,
}

impl<J, L, A, U, F, E, S> SeparationJobUseCase<J, L, A, U, F, E, S>
where
    J: SeparationJobRepository + Send + Sync + 'static,
    L: CreditLedgerRepository + Send + Sync + 'static,
    A: UserAccountRepository + Send + Sync + 'static,
    U: UsageStatsRepository + Send + Sync + 'static,
    F: AudioFileRepository + Send + Sync + 'static,
    E: SeparationEngineClient + Send + Sync + 'static,
    S: StemStorageClient + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_repo: Arc<J>,
        ledger_repo: Arc<L>,
        audio_file_repo: Arc<F>,
        engine_client: Arc<E>,
        storage_client: Arc<S>,
        validator: Arc<EntitlementValidator<A, U>>,
        usage_recorder: Arc<UsageRecorder<U>>,
        storage_bucket: String,
    ) -> Self {
        Self {
            job_repo,
            ledger_repo,
            audio_file_repo,
            engine_client,
            storage_client,
            validator,
            usage_recorder,
            storage_bucket,
        }
    }

    pub async fn create_job(
        &self,
        user_id: Uuid,
        model: CreateSeparationJobModel,
    ) -> JobResult<SeparationJobDto> {
        info!(
            %user_id,
            audio_file_id = %model.audio_file_id,
            stem_count = model.stems.len(),
            quality = %model.quality,
            "separation: create job requested"
        );

        let audio_file = self
            .audio_file_repo
            .find_by_id(model.audio_file_id, user_id)
            .await
            .map_err(|err| {
                error!(
                    %user_id,
                    audio_file_id = %model.audio_file_id,
                    db_error = ?err,
                    "separation: failed to load audio file"
                );
                SeparationJobError::Internal(err)
            })?
            .ok_or(SeparationJobError::AudioFileNotFound)?;

        let request = JobRequest {
            stems: model.stems.clone(),
            quality: model.quality,
            duration_seconds: audio_file.duration_seconds,
            size_bytes: audio_file.size_bytes,
        };
        let entitlement = self.validator.validate(user_id, &request).await?;
        let duration_seconds = audio_file.duration_seconds.unwrap_or_default();

        let selected_stems = serde_json::to_value(&model.stems)
            .map_err(|err| SeparationJobError::Internal(err.into()))?;
        let job = self
            .job_repo
            .insert(InsertSeparationJobEntity {
                user_id,
                audio_file_id: audio_file.id,
                selected_stems,
                quality: model.quality.to_string(),
                duration_seconds,
                status: JobStatus::Pending.to_string(),
                progress: 0,
                created_at: Utc::now(),
            })
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "separation: failed to insert job row");
                SeparationJobError::Internal(err)
            })?;

        info!(
            %user_id,
            job_id = %job.id,
            projected_cost = entitlement.cost,
            "separation: job accepted, dispatching to engine"
        );

        let plan = SubmitRequest::plan(&audio_file.public_url, &model.stems, model.quality);
        match self.engine_client.submit(plan).await {
            Ok(DispatchOutcome::Completed { output_files }) => {
                info!(
                    %user_id,
                    job_id = %job.id,
                    output_count = output_files.len(),
                    "separation: engine completed synchronously"
                );
                let result_files = normalize_output_files(&output_files, &model.stems);
                self.finalize_completion(
                    user_id,
                    job.id,
                    &model.stems,
                    model.quality,
                    duration_seconds,
                    result_files,
                )
                .await
            }
            Ok(DispatchOutcome::Accepted { engine_job_id }) => {
                self.job_repo
                    .mark_processing(job.id, &engine_job_id, QUEUED_PROGRESS)
                    .await
                    .map_err(|err| {
                        error!(
                            %user_id,
                            job_id = %job.id,
                            engine_job_id = %engine_job_id,
                            db_error = ?err,
                            "separation: failed to store engine handle"
                        );
                        SeparationJobError::Internal(err)
                    })?;
                info!(
                    %user_id,
                    job_id = %job.id,
                    engine_job_id = %engine_job_id,
                    "separation: engine accepted job for async processing"
                );
                self.reload(job.id, user_id).await
            }
            Err(err) => {
                warn!(
                    %user_id,
                    job_id = %job.id,
                    error = ?err,
                    "separation: dispatch failed, marking job failed"
                );
                self.fail_job(job.id, &format!("dispatch failed: {}", err))
                    .await?;
                self.reload(job.id, user_id).await
            }
        }
    }

    pub async fn get_job_status(
        &self,
        user_id: Uuid,
        job_id: Uuid,
    ) -> JobResult<SeparationJobDto> {
        let job = self.load(job_id, user_id).await?;

        if JobStatus::from_str(&job.status).is_terminal() {
            return Ok(job.into());
        }

        let Some(engine_job_id) = job.engine_job_id.clone() else {
            // Pending without a handle: dispatch is still in flight in the
            // creating call.
            return Ok(job.into());
        };

        let engine_status = match self.engine_client.fetch_status(&engine_job_id).await {
            Ok(status) => status,
            Err(err) => {
                warn!(
                    %user_id,
                    %job_id,
                    engine_job_id = %engine_job_id,
                    error = ?err,
                    "separation: engine status check failed, returning last known state"
                );
                return Ok(job.into());
            }
        };

        match engine_status.state {
            EngineJobState::Queued | EngineJobState::Processing => {
                let progress = engine_status.progress.unwrap_or(match engine_status.state {
                    EngineJobState::Queued => QUEUED_PROGRESS,
                    _ => PROCESSING_PROGRESS,
                });
                if progress != job.progress {
                    if let Err(err) = self.job_repo.update_progress(job.id, progress).await {
                        warn!(
                            %user_id,
                            %job_id,
                            progress,
                            db_error = ?err,
                            "separation: failed to persist progress update"
                        );
                    }
                }
                let mut dto = SeparationJobDto::from(job);
                dto.progress = progress;
                Ok(dto)
            }
            EngineJobState::Completed => {
                info!(
                    %user_id,
                    %job_id,
                    output_count = engine_status.output_files.len(),
                    "separation: engine reports completion, finalizing"
                );
                let stems: Vec<StemKind> = serde_json::from_value(job.selected_stems.clone())
                    .map_err(|err| SeparationJobError::Internal(err.into()))?;
                let quality = QualityTier::from_str(&job.quality);
                let result_files = normalize_output_files(&engine_status.output_files, &stems);
                self.finalize_completion(
                    user_id,
                    job.id,
                    &stems,
                    quality,
                    job.duration_seconds,
                    result_files,
                )
                .await
            }
            EngineJobState::Failed => {
                let message = engine_status
                    .error
                    .unwrap_or_else(|| "separation failed".to_string());
                warn!(%user_id, %job_id, error = %message, "separation: engine reports failure");
                self.fail_job(job.id, &message).await?;
                self.reload(job.id, user_id).await
            }
        }
    }

    pub async fn list_jobs(&self, user_id: Uuid) -> JobResult<Vec<SeparationJobDto>> {
        let jobs = self.job_repo.list_by_user(user_id).await.map_err(|err| {
            error!(%user_id, db_error = ?err, "separation: failed to list jobs");
            SeparationJobError::Internal(err)
        })?;
        Ok(jobs.into_iter().map(SeparationJobDto::from).collect())
    }

    /// Destructive cleanup: stored stems, ledger rows, then the job row.
    /// A deletion while the engine is still working abandons the engine job;
    /// a completion arriving afterwards finds no active row and is
    /// discarded.
    pub async fn delete_job(&self, user_id: Uuid, job_id: Uuid) -> JobResult<()> {
        let job = self.load(job_id, user_id).await?;

        if !JobStatus::from_str(&job.status).is_terminal() {
            info!(
                %user_id,
                %job_id,
                engine_job_id = ?job.engine_job_id,
                "separation: deleting active job, engine work is abandoned"
            );
        }

        let result_files: Vec<ResultFile> = job
            .result_files
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        for file in &result_files {
            let Some(path) = object_path_from_url(&file.url, &self.storage_bucket) else {
                continue;
            };
            if let Err(err) = self.storage_client.delete_object(&path).await {
                warn!(
                    %user_id,
                    %job_id,
                    storage_path = %path,
                    error = ?err,
                    "separation: failed to delete stored stem, continuing"
                );
            }
        }

        let removed_transactions =
            self.ledger_repo.delete_for_job(job.id).await.map_err(|err| {
                error!(%user_id, %job_id, db_error = ?err, "separation: failed to delete ledger rows");
                SeparationJobError::Internal(err)
            })?;

        let removed = self.job_repo.delete(job.id, user_id).await.map_err(|err| {
            error!(%user_id, %job_id, db_error = ?err, "separation: failed to delete job row");
            SeparationJobError::Internal(err)
        })?;
        if removed == 0 {
            return Err(SeparationJobError::JobNotFound);
        }

        info!(
            %user_id,
            %job_id,
            removed_transactions,
            removed_files = result_files.len(),
            "separation: job deleted"
        );
        Ok(())
    }

    /// The single place a job becomes `completed`. Whoever wins the
    /// conditional transition owns the charge and the usage record; losers
    /// return the stored row untouched.
    async fn finalize_completion(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        stems: &[StemKind],
        quality: QualityTier,
        duration_seconds: f64,
        result_files: Vec<ResultFile>,
    ) -> JobResult<SeparationJobDto> {
        let breakdown = credit_cost::estimate(
            stems.len(),
            credit_cost::exact_minutes(duration_seconds),
            quality,
        );
        let charge = credit_cost::round_credits(breakdown.total_cost);

        let completion = SeparationJobCompletionEntity {
            status: JobStatus::Completed.to_string(),
            progress: 100,
            result_files: serde_json::to_value(&result_files)
                .map_err(|err| SeparationJobError::Internal(err.into()))?,
            credits_charged: charge,
            completed_at: Utc::now(),
        };

        if !self.complete_with_retry(job_id, completion).await? {
            info!(
                %user_id,
                %job_id,
                "separation: job already finalized elsewhere, skipping charge"
            );
            return self.reload(job_id, user_id).await;
        }

        self.charge_job(user_id, job_id, charge).await;
        self.usage_recorder
            .record_separation(user_id, duration_seconds)
            .await;

        self.reload(job_id, user_id).await
    }

    async fn complete_with_retry(
        &self,
        job_id: Uuid,
        completion: SeparationJobCompletionEntity,
    ) -> JobResult<bool> {
        match self
            .job_repo
            .complete_if_active(job_id, completion.clone())
            .await
        {
            Ok(won) => Ok(won),
            Err(first_err) => {
                warn!(
                    %job_id,
                    db_error = ?first_err,
                    "separation: completion write failed, retrying once"
                );
                match self.job_repo.complete_if_active(job_id, completion).await {
                    Ok(won) => Ok(won),
                    Err(err) => {
                        error!(
                            %job_id,
                            db_error = ?err,
                            "separation: completed separation could not be persisted"
                        );
                        Err(SeparationJobError::CompletionNotPersisted)
                    }
                }
            }
        }
    }

    /// Ledger deduction for a freshly completed job. Never unwinds the
    /// completed job: persistent failures and balance shortfalls surface as
    /// error-level reconciliation alerts instead.
    async fn charge_job(&self, user_id: Uuid, job_id: Uuid, amount: f64) {
        let description = "stem separation charge";
        let outcome = match self
            .ledger_repo
            .deduct_for_job(user_id, amount, job_id, description)
            .await
        {
            Ok(outcome) => outcome,
            Err(first_err) => {
                warn!(
                    %user_id,
                    %job_id,
                    amount,
                    db_error = ?first_err,
                    "separation: ledger deduction failed, retrying once"
                );
                match self
                    .ledger_repo
                    .deduct_for_job(user_id, amount, job_id, description)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(
                            %user_id,
                            %job_id,
                            amount,
                            db_error = ?err,
                            "separation: ledger deduction could not be persisted, balance needs reconciliation"
                        );
                        return;
                    }
                }
            }
        };

        match outcome {
            DeductionOutcome::Applied { new_balance } => {
                info!(%user_id, %job_id, amount, new_balance, "separation: credits charged");
            }
            DeductionOutcome::InsufficientBalance { remaining } => {
                error!(
                    %user_id,
                    %job_id,
                    amount,
                    remaining,
                    "separation: balance fell below the validated cost, job delivered without full charge"
                );
            }
            DeductionOutcome::DuplicateCharge => {
                error!(
                    %user_id,
                    %job_id,
                    "separation: ledger already holds a deduction for this job"
                );
            }
        }
    }

    async fn fail_job(&self, job_id: Uuid, message: &str) -> JobResult<()> {
        let failure = SeparationJobFailureEntity {
            status: JobStatus::Failed.to_string(),
            error: message.to_string(),
            completed_at: Utc::now(),
        };
        let applied = self
            .job_repo
            .fail_if_active(job_id, failure)
            .await
            .map_err(|err| {
                error!(%job_id, db_error = ?err, "separation: failed to record job failure");
                SeparationJobError::Internal(err)
            })?;
        if !applied {
            info!(%job_id, "separation: job already terminal, failure not recorded");
        }
        Ok(())
    }

    async fn load(&self, job_id: Uuid, user_id: Uuid) -> JobResult<SeparationJobEntity> {
        self.job_repo
            .find_by_id(job_id, user_id)
            .await
            .map_err(|err| {
                error!(%user_id, %job_id, db_error = ?err, "separation: failed to load job");
                SeparationJobError::Internal(err)
            })?
            .ok_or(SeparationJobError::JobNotFound)
    }

    async fn reload(&self, job_id: Uuid, user_id: Uuid) -> JobResult<SeparationJobDto> {
        Ok(self.load(job_id, user_id).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use domain::{
        entities::{audio_files::AudioFileEntity, user_accounts::UserAccountEntity},
        repositories::{
            audio_file::MockAudioFileRepository, credit_ledger::MockCreditLedgerRepository,
            separation_job::MockSeparationJobRepository, usage_stats::MockUsageStatsRepository,
            user_account::MockUserAccountRepository,
        },
        value_objects::enums::subscription_tiers::SubscriptionTier,
    };
    use mockall::predicate::eq;
    use serde_json::json;

    use crate::interfaces::separation_engine::{EngineJobStatus, EngineOutputFile};

    type TestUseCase = SeparationJobUseCase<
        MockSeparationJobRepository,
        MockCreditLedgerRepository,
        MockUserAccountRepository,
        MockUsageStatsRepository,
        MockAudioFileRepository,
        crate::interfaces::separation_engine::MockSeparationEngineClient,
        crate::interfaces::storage::MockStemStorageClient,
    >;

    struct Mocks {
        job_repo: MockSeparationJobRepository,
        ledger_repo: MockCreditLedgerRepository,
        account_repo: MockUserAccountRepository,
        usage_repo: MockUsageStatsRepository,
        audio_file_repo: MockAudioFileRepository,
        engine_client: crate::interfaces::separation_engine::MockSeparationEngineClient,
        storage_client: crate::interfaces::storage::MockStemStorageClient,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                job_repo: MockSeparationJobRepository::new(),
                ledger_repo: MockCreditLedgerRepository::new(),
                account_repo: MockUserAccountRepository::new(),
                usage_repo: MockUsageStatsRepository::new(),
                audio_file_repo: MockAudioFileRepository::new(),
                engine_client:
                    crate::interfaces::separation_engine::MockSeparationEngineClient::new(),
                storage_client: crate::interfaces::storage::MockStemStorageClient::new(),
            }
        }

        fn into_usecase(self) -> TestUseCase {
            let account_repo = Arc::new(self.account_repo);
            let usage_repo = Arc::new(self.usage_repo);
            SeparationJobUseCase::new(
                Arc::new(self.job_repo),
                Arc::new(self.ledger_repo),
                Arc::new(self.audio_file_repo),
                Arc::new(self.engine_client),
                Arc::new(self.storage_client),
                Arc::new(EntitlementValidator::new(account_repo, Arc::clone(&usage_repo))),
                Arc::new(UsageRecorder::new(usage_repo)),
                "audio-files".to_string(),
            )
        }
    }

    fn sample_audio_file(id: Uuid, user_id: Uuid) -> AudioFileEntity {
        AudioFileEntity {
            id,
            user_id,
            storage_path: format!("{}/uploads/song.mp3", user_id),
            public_url: "https://abc.supabase.co/storage/v1/object/public/audio-files/u1/song.mp3"
                .to_string(),
            duration_seconds: Some(300.0),
            size_bytes: Some(8 * 1024 * 1024),
            created_at: Utc::now(),
        }
    }

    fn sample_account(id: Uuid, credits_remaining: f64) -> UserAccountEntity {
        let now = Utc::now();
        UserAccountEntity {
            id,
            subscription_tier: SubscriptionTier::Free.to_string(),
            credits_total: 10.0,
            credits_remaining,
            created_at: now,
            updated_at: now,
        }
    }

    fn job_entity(id: Uuid, user_id: Uuid, audio_file_id: Uuid, status: JobStatus) -> SeparationJobEntity {
        SeparationJobEntity {
            id,
            user_id,
            audio_file_id,
            selected_stems: json!(["vocals", "drums"]),
            quality: "standard".to_string(),
            duration_seconds: 300.0,
            status: status.to_string(),
            progress: match status {
                JobStatus::Pending => 0,
                JobStatus::Processing => 10,
                _ => 100,
            },
            engine_job_id: match status {
                JobStatus::Pending => None,
                _ => Some("sieve-123".to_string()),
            },
            result_files: None,
            error: None,
            credits_charged: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn completed_entity(id: Uuid, user_id: Uuid, audio_file_id: Uuid) -> SeparationJobEntity {
        let mut entity = job_entity(id, user_id, audio_file_id, JobStatus::Completed);
        entity.result_files = Some(json!([
            {"stem_name": "vocals", "url": "https://abc.supabase.co/storage/v1/object/public/audio-files/u1/separated/a_vocals.wav"},
            {"stem_name": "drums", "url": "https://abc.supabase.co/storage/v1/object/public/audio-files/u1/separated/a_drums.wav"}
        ]));
        entity.credits_charged = Some(8.0);
        entity.completed_at = Some(Utc::now());
        entity
    }

    fn create_model(audio_file_id: Uuid) -> CreateSeparationJobModel {
        CreateSeparationJobModel {
            audio_file_id,
            stems: vec![StemKind::Vocals, StemKind::Drums],
            quality: QualityTier::Standard,
        }
    }

    fn engine_outputs() -> Vec<EngineOutputFile> {
        vec![
            EngineOutputFile {
                index: Some(0),
                stem_name: None,
                url: Some("https://cdn.example/vocals.wav".to_string()),
            },
            EngineOutputFile {
                index: Some(1),
                stem_name: None,
                url: Some("https://cdn.example/drums.wav".to_string()),
            },
        ]
    }

    fn expect_eligible_free_account(mocks: &mut Mocks, user_id: Uuid, credits_remaining: f64) {
        let account = sample_account(user_id, credits_remaining);
        mocks
            .account_repo
            .expect_find_by_id()
            .with(eq(user_id))
            .returning(move |_| {
                let account = account.clone();
                Box::pin(async move { Ok(Some(account)) })
            });
        mocks
            .usage_repo
            .expect_find()
            .returning(|_, _| Box::pin(async { Ok(None) }));
    }

    #[tokio::test]
    async fn synchronous_completion_charges_exactly_once() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let audio_file = sample_audio_file(audio_file_id, user_id);
        mocks
            .audio_file_repo
            .expect_find_by_id()
            .with(eq(audio_file_id), eq(user_id))
            .returning(move |_, _| {
                let audio_file = audio_file.clone();
                Box::pin(async move { Ok(Some(audio_file)) })
            });
        expect_eligible_free_account(&mut mocks, user_id, 10.0);

        let inserted = job_entity(job_id, user_id, audio_file_id, JobStatus::Pending);
        mocks
            .job_repo
            .expect_insert()
            .withf(move |insert| {
                insert.user_id == user_id
                    && insert.status == "pending"
                    && insert.duration_seconds == 300.0
            })
            .returning(move |_| {
                let inserted = inserted.clone();
                Box::pin(async move { Ok(inserted) })
            });

        mocks
            .engine_client
            .expect_submit()
            .withf(|request| request.model == "htdemucs" && request.two_stems.is_none())
            .returning(|_| {
                Box::pin(async {
                    Ok(DispatchOutcome::Completed {
                        output_files: engine_outputs(),
                    })
                })
            });

        mocks
            .job_repo
            .expect_complete_if_active()
            .times(1)
            .withf(move |id, completion| {
                *id == job_id
                    && completion.status == "completed"
                    && completion.credits_charged == 8.0
                    && completion.progress == 100
            })
            .returning(|_, _| Box::pin(async { Ok(true) }));

        mocks
            .ledger_repo
            .expect_deduct_for_job()
            .times(1)
            .withf(move |uid, amount, jid, _desc| {
                *uid == user_id && *amount == 8.0 && *jid == job_id
            })
            .returning(|_, _, _, _| {
                Box::pin(async { Ok(DeductionOutcome::Applied { new_balance: 2.0 }) })
            });

        mocks
            .usage_repo
            .expect_increment()
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let reloaded = completed_entity(job_id, user_id, audio_file_id);
        mocks
            .job_repo
            .expect_find_by_id()
            .with(eq(job_id), eq(user_id))
            .returning(move |_, _| {
                let reloaded = reloaded.clone();
                Box::pin(async move { Ok(Some(reloaded)) })
            });

        let dto = mocks
            .into_usecase()
            .create_job(user_id, create_model(audio_file_id))
            .await
            .unwrap();

        assert_eq!(dto.status, "completed");
        assert_eq!(dto.credits_charged, Some(8.0));
        assert_eq!(dto.result_files.len(), 2);
    }

    #[tokio::test]
    async fn asynchronous_acceptance_defers_charging() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let audio_file = sample_audio_file(audio_file_id, user_id);
        mocks
            .audio_file_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let audio_file = audio_file.clone();
                Box::pin(async move { Ok(Some(audio_file)) })
            });
        expect_eligible_free_account(&mut mocks, user_id, 10.0);

        let inserted = job_entity(job_id, user_id, audio_file_id, JobStatus::Pending);
        mocks.job_repo.expect_insert().returning(move |_| {
            let inserted = inserted.clone();
            Box::pin(async move { Ok(inserted) })
        });

        mocks.engine_client.expect_submit().returning(|_| {
            Box::pin(async {
                Ok(DispatchOutcome::Accepted {
                    engine_job_id: "sieve-123".to_string(),
                })
            })
        });

        mocks
            .job_repo
            .expect_mark_processing()
            .times(1)
            .with(eq(job_id), eq("sieve-123"), eq(QUEUED_PROGRESS))
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let processing = job_entity(job_id, user_id, audio_file_id, JobStatus::Processing);
        mocks
            .job_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let processing = processing.clone();
                Box::pin(async move { Ok(Some(processing)) })
            });

        let dto = mocks
            .into_usecase()
            .create_job(user_id, create_model(audio_file_id))
            .await
            .unwrap();

        assert_eq!(dto.status, "processing");
        assert_eq!(dto.credits_charged, None);
    }

    #[tokio::test]
    async fn dispatch_failure_fails_the_job_without_charging() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let audio_file = sample_audio_file(audio_file_id, user_id);
        mocks
            .audio_file_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let audio_file = audio_file.clone();
                Box::pin(async move { Ok(Some(audio_file)) })
            });
        expect_eligible_free_account(&mut mocks, user_id, 10.0);

        let inserted = job_entity(job_id, user_id, audio_file_id, JobStatus::Pending);
        mocks.job_repo.expect_insert().returning(move |_| {
            let inserted = inserted.clone();
            Box::pin(async move { Ok(inserted) })
        });

        mocks
            .engine_client
            .expect_submit()
            .returning(|_| Box::pin(async { Err(anyhow!("engine unreachable")) }));

        mocks
            .job_repo
            .expect_fail_if_active()
            .times(1)
            .withf(move |id, failure| {
                *id == job_id
                    && failure.status == "failed"
                    && failure.error.contains("dispatch failed")
            })
            .returning(|_, _| Box::pin(async { Ok(true) }));

        let mut failed = job_entity(job_id, user_id, audio_file_id, JobStatus::Failed);
        failed.error = Some("dispatch failed: engine unreachable".to_string());
        mocks.job_repo.expect_find_by_id().returning(move |_, _| {
            let failed = failed.clone();
            Box::pin(async move { Ok(Some(failed)) })
        });

        let dto = mocks
            .into_usecase()
            .create_job(user_id, create_model(audio_file_id))
            .await
            .unwrap();

        assert_eq!(dto.status, "failed");
        assert_eq!(dto.credits_charged, None);
        assert!(dto.error.unwrap().contains("dispatch failed"));
    }

    #[tokio::test]
    async fn insufficient_credits_rejects_before_any_row_exists() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let audio_file = sample_audio_file(audio_file_id, user_id);
        mocks
            .audio_file_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let audio_file = audio_file.clone();
                Box::pin(async move { Ok(Some(audio_file)) })
            });
        expect_eligible_free_account(&mut mocks, user_id, 2.0);

        let err = mocks
            .into_usecase()
            .create_job(user_id, create_model(audio_file_id))
            .await
            .unwrap_err();

        match err {
            SeparationJobError::Rejected(ValidationError::InsufficientCredits {
                required,
                remaining,
            }) => {
                assert_eq!(required, 8.0);
                assert_eq!(remaining, 2.0);
            }
            other => panic!("expected InsufficientCredits, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_audio_duration_rejects_before_any_row_exists() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let mut audio_file = sample_audio_file(audio_file_id, user_id);
        audio_file.duration_seconds = None;
        mocks
            .audio_file_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let audio_file = audio_file.clone();
                Box::pin(async move { Ok(Some(audio_file)) })
            });

        let err = mocks
            .into_usecase()
            .create_job(user_id, create_model(audio_file_id))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SeparationJobError::Rejected(ValidationError::InvalidDuration)
        ));
    }

    #[tokio::test]
    async fn poll_finalizes_engine_completion_and_charges_once() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let processing = job_entity(job_id, user_id, audio_file_id, JobStatus::Processing);
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let processing = processing.clone();
                Box::pin(async move { Ok(Some(processing)) })
            });

        mocks
            .engine_client
            .expect_fetch_status()
            .with(eq("sieve-123"))
            .returning(|_| {
                Box::pin(async {
                    Ok(EngineJobStatus {
                        state: EngineJobState::Completed,
                        progress: Some(100),
                        output_files: engine_outputs(),
                        error: None,
                    })
                })
            });

        mocks
            .job_repo
            .expect_complete_if_active()
            .times(1)
            .withf(move |id, completion| *id == job_id && completion.credits_charged == 8.0)
            .returning(|_, _| Box::pin(async { Ok(true) }));

        mocks
            .ledger_repo
            .expect_deduct_for_job()
            .times(1)
            .returning(|_, _, _, _| {
                Box::pin(async { Ok(DeductionOutcome::Applied { new_balance: 2.0 }) })
            });

        mocks
            .usage_repo
            .expect_increment()
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let reloaded = completed_entity(job_id, user_id, audio_file_id);
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let reloaded = reloaded.clone();
                Box::pin(async move { Ok(Some(reloaded)) })
            });

        let dto = mocks
            .into_usecase()
            .get_job_status(user_id, job_id)
            .await
            .unwrap();

        assert_eq!(dto.status, "completed");
        assert_eq!(dto.credits_charged, Some(8.0));
    }

    #[tokio::test]
    async fn losing_the_completion_race_skips_the_charge() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let processing = job_entity(job_id, user_id, audio_file_id, JobStatus::Processing);
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let processing = processing.clone();
                Box::pin(async move { Ok(Some(processing)) })
            });

        mocks.engine_client.expect_fetch_status().returning(|_| {
            Box::pin(async {
                Ok(EngineJobStatus {
                    state: EngineJobState::Completed,
                    progress: Some(100),
                    output_files: engine_outputs(),
                    error: None,
                })
            })
        });

        mocks
            .job_repo
            .expect_complete_if_active()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(false) }));

        let winner_wrote = completed_entity(job_id, user_id, audio_file_id);
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let winner_wrote = winner_wrote.clone();
                Box::pin(async move { Ok(Some(winner_wrote)) })
            });

        let dto = mocks
            .into_usecase()
            .get_job_status(user_id, job_id)
            .await
            .unwrap();

        assert_eq!(dto.status, "completed");
        assert_eq!(dto.credits_charged, Some(8.0));
    }

    #[tokio::test]
    async fn poll_marks_failed_without_charge_on_engine_failure() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let processing = job_entity(job_id, user_id, audio_file_id, JobStatus::Processing);
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let processing = processing.clone();
                Box::pin(async move { Ok(Some(processing)) })
            });

        mocks.engine_client.expect_fetch_status().returning(|_| {
            Box::pin(async {
                Ok(EngineJobStatus {
                    state: EngineJobState::Failed,
                    progress: None,
                    output_files: Vec::new(),
                    error: Some("model crashed".to_string()),
                })
            })
        });

        mocks
            .job_repo
            .expect_fail_if_active()
            .times(1)
            .withf(|_, failure| failure.error == "model crashed")
            .returning(|_, _| Box::pin(async { Ok(true) }));

        let mut failed = job_entity(job_id, user_id, audio_file_id, JobStatus::Failed);
        failed.error = Some("model crashed".to_string());
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let failed = failed.clone();
                Box::pin(async move { Ok(Some(failed)) })
            });

        let dto = mocks
            .into_usecase()
            .get_job_status(user_id, job_id)
            .await
            .unwrap();

        assert_eq!(dto.status, "failed");
        assert_eq!(dto.error, Some("model crashed".to_string()));
        assert_eq!(dto.credits_charged, None);
    }

    #[tokio::test]
    async fn poll_keeps_last_state_when_the_engine_is_unreachable() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let processing = job_entity(job_id, user_id, audio_file_id, JobStatus::Processing);
        mocks
            .job_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let processing = processing.clone();
                Box::pin(async move { Ok(Some(processing)) })
            });

        mocks
            .engine_client
            .expect_fetch_status()
            .returning(|_| Box::pin(async { Err(anyhow!("connection reset")) }));

        let dto = mocks
            .into_usecase()
            .get_job_status(user_id, job_id)
            .await
            .unwrap();

        assert_eq!(dto.status, "processing");
        assert_eq!(dto.progress, 10);
    }

    #[tokio::test]
    async fn poll_updates_progress_while_the_engine_is_working() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let processing = job_entity(job_id, user_id, audio_file_id, JobStatus::Processing);
        mocks
            .job_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let processing = processing.clone();
                Box::pin(async move { Ok(Some(processing)) })
            });

        mocks.engine_client.expect_fetch_status().returning(|_| {
            Box::pin(async {
                Ok(EngineJobStatus {
                    state: EngineJobState::Processing,
                    progress: Some(62),
                    output_files: Vec::new(),
                    error: None,
                })
            })
        });

        mocks
            .job_repo
            .expect_update_progress()
            .times(1)
            .with(eq(job_id), eq(62))
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let dto = mocks
            .into_usecase()
            .get_job_status(user_id, job_id)
            .await
            .unwrap();

        assert_eq!(dto.status, "processing");
        assert_eq!(dto.progress, 62);
    }

    #[tokio::test]
    async fn terminal_jobs_are_returned_without_an_engine_call() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let completed = completed_entity(job_id, user_id, audio_file_id);
        mocks
            .job_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let completed = completed.clone();
                Box::pin(async move { Ok(Some(completed)) })
            });

        let dto = mocks
            .into_usecase()
            .get_job_status(user_id, job_id)
            .await
            .unwrap();

        assert_eq!(dto.status, "completed");
        assert_eq!(dto.result_files.len(), 2);
    }

    #[tokio::test]
    async fn completion_retries_once_before_reporting_a_system_error() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let processing = job_entity(job_id, user_id, audio_file_id, JobStatus::Processing);
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let processing = processing.clone();
                Box::pin(async move { Ok(Some(processing)) })
            });

        mocks.engine_client.expect_fetch_status().returning(|_| {
            Box::pin(async {
                Ok(EngineJobStatus {
                    state: EngineJobState::Completed,
                    progress: Some(100),
                    output_files: engine_outputs(),
                    error: None,
                })
            })
        });

        mocks
            .job_repo
            .expect_complete_if_active()
            .times(1)
            .returning(|_, _| Box::pin(async { Err(anyhow!("deadlock detected")) }));
        mocks
            .job_repo
            .expect_complete_if_active()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(true) }));

        mocks
            .ledger_repo
            .expect_deduct_for_job()
            .times(1)
            .returning(|_, _, _, _| {
                Box::pin(async { Ok(DeductionOutcome::Applied { new_balance: 2.0 }) })
            });
        mocks
            .usage_repo
            .expect_increment()
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let reloaded = completed_entity(job_id, user_id, audio_file_id);
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let reloaded = reloaded.clone();
                Box::pin(async move { Ok(Some(reloaded)) })
            });

        let dto = mocks
            .into_usecase()
            .get_job_status(user_id, job_id)
            .await
            .unwrap();

        assert_eq!(dto.status, "completed");
    }

    #[tokio::test]
    async fn unpersistable_completion_is_a_system_error_not_a_failed_job() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let processing = job_entity(job_id, user_id, audio_file_id, JobStatus::Processing);
        mocks
            .job_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let processing = processing.clone();
                Box::pin(async move { Ok(Some(processing)) })
            });

        mocks.engine_client.expect_fetch_status().returning(|_| {
            Box::pin(async {
                Ok(EngineJobStatus {
                    state: EngineJobState::Completed,
                    progress: Some(100),
                    output_files: engine_outputs(),
                    error: None,
                })
            })
        });

        mocks
            .job_repo
            .expect_complete_if_active()
            .times(2)
            .returning(|_, _| Box::pin(async { Err(anyhow!("connection pool exhausted")) }));

        let err = mocks
            .into_usecase()
            .get_job_status(user_id, job_id)
            .await
            .unwrap_err();

        assert!(matches!(err, SeparationJobError::CompletionNotPersisted));
    }

    #[tokio::test]
    async fn ledger_failure_after_completion_keeps_the_job_completed() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let processing = job_entity(job_id, user_id, audio_file_id, JobStatus::Processing);
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let processing = processing.clone();
                Box::pin(async move { Ok(Some(processing)) })
            });

        mocks.engine_client.expect_fetch_status().returning(|_| {
            Box::pin(async {
                Ok(EngineJobStatus {
                    state: EngineJobState::Completed,
                    progress: Some(100),
                    output_files: engine_outputs(),
                    error: None,
                })
            })
        });

        mocks
            .job_repo
            .expect_complete_if_active()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(true) }));

        mocks
            .ledger_repo
            .expect_deduct_for_job()
            .times(2)
            .returning(|_, _, _, _| Box::pin(async { Err(anyhow!("ledger unavailable")) }));

        mocks
            .usage_repo
            .expect_increment()
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let reloaded = completed_entity(job_id, user_id, audio_file_id);
        mocks
            .job_repo
            .expect_find_by_id()
            .times(1)
            .returning(move |_, _| {
                let reloaded = reloaded.clone();
                Box::pin(async move { Ok(Some(reloaded)) })
            });

        let dto = mocks
            .into_usecase()
            .get_job_status(user_id, job_id)
            .await
            .unwrap();

        assert_eq!(dto.status, "completed");
    }

    #[tokio::test]
    async fn delete_removes_storage_objects_ledger_rows_and_the_job() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let completed = completed_entity(job_id, user_id, audio_file_id);
        mocks
            .job_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let completed = completed.clone();
                Box::pin(async move { Ok(Some(completed)) })
            });

        mocks
            .storage_client
            .expect_delete_object()
            .times(1)
            .with(eq("u1/separated/a_vocals.wav"))
            .returning(|_| Box::pin(async { Ok(()) }));
        mocks
            .storage_client
            .expect_delete_object()
            .times(1)
            .with(eq("u1/separated/a_drums.wav"))
            .returning(|_| Box::pin(async { Ok(()) }));

        mocks
            .ledger_repo
            .expect_delete_for_job()
            .times(1)
            .with(eq(job_id))
            .returning(|_| Box::pin(async { Ok(1) }));

        mocks
            .job_repo
            .expect_delete()
            .times(1)
            .with(eq(job_id), eq(user_id))
            .returning(|_, _| Box::pin(async { Ok(1) }));

        mocks
            .into_usecase()
            .delete_job(user_id, job_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deleting_a_missing_job_reports_not_found() {
        let user_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        mocks
            .job_repo
            .expect_find_by_id()
            .returning(|_, _| Box::pin(async { Ok(None) }));

        let err = mocks
            .into_usecase()
            .delete_job(user_id, job_id)
            .await
            .unwrap_err();

        assert!(matches!(err, SeparationJobError::JobNotFound));
    }

    #[tokio::test]
    async fn delete_survives_storage_cleanup_failures() {
        let user_id = Uuid::new_v4();
        let audio_file_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let mut mocks = Mocks::new();

        let completed = completed_entity(job_id, user_id, audio_file_id);
        mocks
            .job_repo
            .expect_find_by_id()
            .returning(move |_, _| {
                let completed = completed.clone();
                Box::pin(async move { Ok(Some(completed)) })
            });

        mocks
            .storage_client
            .expect_delete_object()
            .times(2)
            .returning(|_| Box::pin(async { Err(anyhow!("bucket unavailable")) }));

        mocks
            .ledger_repo
            .expect_delete_for_job()
            .times(1)
            .returning(|_| Box::pin(async { Ok(1) }));

        mocks
            .job_repo
            .expect_delete()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(1) }));

        mocks
            .into_usecase()
            .delete_job(user_id, job_id)
            .await
            .unwrap();
    }
}
