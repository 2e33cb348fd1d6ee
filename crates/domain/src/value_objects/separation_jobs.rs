use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::enums::{quality_tiers::QualityTier, stems::StemKind};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSeparationJobModel {
    pub audio_file_id: Uuid,
    pub stems: Vec<StemKind>,
    #[serde(default)]
    pub quality: QualityTier,
}

/// One isolated track produced by a finished job. Stored as JSONB on the job
/// row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultFile {
    pub stem_name: String,
    pub url: String,
}
