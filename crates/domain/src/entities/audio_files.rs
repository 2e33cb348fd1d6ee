use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::audio_files;

/// Uploaded source audio. Rows are written by the upload service; this
/// system only reads them.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = audio_files)]
pub struct AudioFileEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub storage_path: String,
    pub public_url: String,
    pub duration_seconds: Option<f64>,
    pub size_bytes: Option<i64>,
    pub created_at: DateTime<Utc>,
}
