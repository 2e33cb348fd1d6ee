use anyhow::Result;
use async_trait::async_trait;
use diesel::{delete, insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::separation_jobs::{
        InsertSeparationJobEntity, SeparationJobCompletionEntity, SeparationJobEntity,
        SeparationJobFailureEntity,
    },
    repositories::separation_job::SeparationJobRepository,
    schema::separation_jobs,
    value_objects::enums::job_statuses::JobStatus,
};

pub struct SeparationJobPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SeparationJobPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

fn active_statuses() -> [String; 2] {
    [
        JobStatus::Pending.to_string(),
        JobStatus::Processing.to_string(),
    ]
}

#[async_trait]
impl SeparationJobRepository for SeparationJobPostgres {
    async fn insert(
        &self,
        insert_entity: InsertSeparationJobEntity,
    ) -> Result<SeparationJobEntity> {
        // Diesel is synchronous; run DB work on the blocking threadpool.
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<SeparationJobEntity> {
            let mut conn = db_pool.get()?;

            let result = insert_into(separation_jobs::table)
                .values(&insert_entity)
                .returning(SeparationJobEntity::as_select())
                .get_result::<SeparationJobEntity>(&mut conn)?;

            Ok(result)
        })
        .await??)
    }

    async fn find_by_id(
        &self,
        job_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<SeparationJobEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(
            task::spawn_blocking(move || -> Result<Option<SeparationJobEntity>> {
                let mut conn = db_pool.get()?;

                let result = separation_jobs::table
                    .filter(separation_jobs::id.eq(job_id))
                    .filter(separation_jobs::user_id.eq(user_id))
                    .select(SeparationJobEntity::as_select())
                    .first::<SeparationJobEntity>(&mut conn)
                    .optional()?;

                Ok(result)
            })
            .await??,
        )
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<SeparationJobEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(
            task::spawn_blocking(move || -> Result<Vec<SeparationJobEntity>> {
                let mut conn = db_pool.get()?;

                let results = separation_jobs::table
                    .filter(separation_jobs::user_id.eq(user_id))
                    .select(SeparationJobEntity::as_select())
                    .order(separation_jobs::created_at.desc())
                    .load::<SeparationJobEntity>(&mut conn)?;

                Ok(results)
            })
            .await??,
        )
    }

    async fn mark_processing(
        &self,
        job_id: Uuid,
        engine_job_id: &str,
        progress: i32,
    ) -> Result<()> {
        let db_pool = Arc::clone(&self.db_pool);
        let engine_job_id = engine_job_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db_pool.get()?;

            update(separation_jobs::table)
                .filter(separation_jobs::id.eq(job_id))
                .set((
                    separation_jobs::status.eq(JobStatus::Processing.to_string()),
                    separation_jobs::engine_job_id.eq(Some(engine_job_id)),
                    separation_jobs::progress.eq(progress),
                ))
                .execute(&mut conn)?;

            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn update_progress(&self, job_id: Uuid, progress: i32) -> Result<()> {
        let db_pool = Arc::clone(&self.db_pool);

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db_pool.get()?;

            // The status filter keeps a late progress report from reviving a
            // job that already went terminal.
            update(separation_jobs::table)
                .filter(separation_jobs::id.eq(job_id))
                .filter(separation_jobs::status.eq(JobStatus::Processing.to_string()))
                .set(separation_jobs::progress.eq(progress))
                .execute(&mut conn)?;

            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn complete_if_active(
        &self,
        job_id: Uuid,
        completion: SeparationJobCompletionEntity,
    ) -> Result<bool> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<bool> {
            let mut conn = db_pool.get()?;

            let rows = update(separation_jobs::table)
                .filter(separation_jobs::id.eq(job_id))
                .filter(separation_jobs::status.eq_any(active_statuses()))
                .set(&completion)
                .execute(&mut conn)?;

            Ok(rows > 0)
        })
        .await??)
    }

    async fn fail_if_active(
        &self,
        job_id: Uuid,
        failure: SeparationJobFailureEntity,
    ) -> Result<bool> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<bool> {
            let mut conn = db_pool.get()?;

            let rows = update(separation_jobs::table)
                .filter(separation_jobs::id.eq(job_id))
                .filter(separation_jobs::status.eq_any(active_statuses()))
                .set(&failure)
                .execute(&mut conn)?;

            Ok(rows > 0)
        })
        .await??)
    }

    async fn delete(&self, job_id: Uuid, user_id: Uuid) -> Result<usize> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db_pool.get()?;

            let rows = delete(separation_jobs::table)
                .filter(separation_jobs::id.eq(job_id))
                .filter(separation_jobs::user_id.eq(user_id))
                .execute(&mut conn)?;

            Ok(rows)
        })
        .await??)
    }
}
