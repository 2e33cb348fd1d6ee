use chrono::{DateTime, Utc};
use diesel::{AsChangeset, prelude::*};
use uuid::Uuid;

use crate::schema::separation_jobs;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = separation_jobs)]
pub struct SeparationJobEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub audio_file_id: Uuid,
    pub selected_stems: serde_json::Value,
    pub quality: String,
    pub duration_seconds: f64,
    pub status: String,
    pub progress: i32,
    pub engine_job_id: Option<String>,
    pub result_files: Option<serde_json::Value>,
    pub error: Option<String>,
    pub credits_charged: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = separation_jobs)]
pub struct InsertSeparationJobEntity {
    pub user_id: Uuid,
    pub audio_file_id: Uuid,
    pub selected_stems: serde_json::Value,
    pub quality: String,
    pub duration_seconds: f64,
    pub status: String,
    pub progress: i32,
    pub created_at: DateTime<Utc>,
}

/// Terminal transition payload for a job that finished successfully.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = separation_jobs)]
pub struct SeparationJobCompletionEntity {
    pub status: String,
    pub progress: i32,
    pub result_files: serde_json::Value,
    pub credits_charged: f64,
    pub completed_at: DateTime<Utc>,
}

/// Terminal transition payload for a job that could not be delivered.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = separation_jobs)]
pub struct SeparationJobFailureEntity {
    pub status: String,
    pub error: String,
    pub completed_at: DateTime<Utc>,
}
