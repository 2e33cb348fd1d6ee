use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::separation_jobs::{
    InsertSeparationJobEntity, SeparationJobCompletionEntity, SeparationJobEntity,
    SeparationJobFailureEntity,
};

#[async_trait]
#[automock]
pub trait SeparationJobRepository {
    async fn insert(&self, insert_entity: InsertSeparationJobEntity) -> Result<SeparationJobEntity>;

    async fn find_by_id(&self, job_id: Uuid, user_id: Uuid)
    -> Result<Option<SeparationJobEntity>>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<SeparationJobEntity>>;

    async fn mark_processing(&self, job_id: Uuid, engine_job_id: &str, progress: i32)
    -> Result<()>;

    /// Progress updates only apply while the job is still processing.
    async fn update_progress(&self, job_id: Uuid, progress: i32) -> Result<()>;

    /// Conditionally moves a still-active (pending or processing) job to
    /// `completed`. Returns false when the row was already terminal or gone,
    /// in which case nothing was written.
    async fn complete_if_active(
        &self,
        job_id: Uuid,
        completion: SeparationJobCompletionEntity,
    ) -> Result<bool>;

    /// Conditionally moves a still-active job to `failed`. Same contract as
    /// `complete_if_active`.
    async fn fail_if_active(&self, job_id: Uuid, failure: SeparationJobFailureEntity)
    -> Result<bool>;

    /// Returns the number of rows removed (0 or 1).
    async fn delete(&self, job_id: Uuid, user_id: Uuid) -> Result<usize>;
}
