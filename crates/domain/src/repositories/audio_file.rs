use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::entities::audio_files::AudioFileEntity;

#[async_trait]
#[automock]
pub trait AudioFileRepository {
    async fn find_by_id(&self, audio_file_id: Uuid, user_id: Uuid)
    -> Result<Option<AudioFileEntity>>;
}
