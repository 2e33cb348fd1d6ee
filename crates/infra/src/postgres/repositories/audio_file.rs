use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::postgres::postgres_connection::PgPoolSquad;
use domain::{
    entities::audio_files::AudioFileEntity, repositories::audio_file::AudioFileRepository,
    schema::audio_files,
};

pub struct AudioFilePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl AudioFilePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl AudioFileRepository for AudioFilePostgres {
    async fn find_by_id(
        &self,
        audio_file_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<AudioFileEntity>> {
        // Diesel is synchronous; run DB work on the blocking threadpool.
        let db_pool = Arc::clone(&self.db_pool);

        Ok(
            task::spawn_blocking(move || -> Result<Option<AudioFileEntity>> {
                let mut conn = db_pool.get()?;

                let result = audio_files::table
                    .filter(audio_files::id.eq(audio_file_id))
                    .filter(audio_files::user_id.eq(user_id))
                    .select(AudioFileEntity::as_select())
                    .first::<AudioFileEntity>(&mut conn)
                    .optional()?;

                Ok(result)
            })
            .await??,
        )
    }
}
