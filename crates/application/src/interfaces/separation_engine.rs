use anyhow::Result;
use async_trait::async_trait;
use domain::value_objects::{
    enums::{quality_tiers::QualityTier, stems::StemKind},
    separation_jobs::ResultFile,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const BASE_MODEL: &str = "htdemucs";
pub const PRO_MODEL: &str = "htdemucs_ft";
pub const SIX_STEM_MODEL: &str = "htdemucs_6s";

const OVERLAP: f64 = 0.25;
const OUTPUT_FORMAT: &str = "wav";

/// Fully planned engine call: which Demucs variant to run and how.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubmitRequest {
    pub audio_url: String,
    pub model: String,
    pub two_stems: Option<String>,
    pub overlap: f64,
    pub shifts: i32,
    pub audio_format: String,
}

impl SubmitRequest {
    /// Chooses the model family and separation mode for a stem selection:
    /// guitar or piano forces the six-stem model, pro quality upgrades the
    /// base model to the fine-tuned variant and enables shifts, and a
    /// single-stem selection runs in two-stem mode.
    pub fn plan(audio_url: &str, stems: &[StemKind], quality: QualityTier) -> Self {
        let needs_six_stems = stems.iter().any(|stem| stem.requires_six_stem_model());
        let model = if needs_six_stems {
            SIX_STEM_MODEL
        } else if quality == QualityTier::Pro {
            PRO_MODEL
        } else {
            BASE_MODEL
        };

        let two_stems = match stems {
            [only] => Some(only.to_string()),
            _ => None,
        };

        let shifts = if quality == QualityTier::Pro { 1 } else { 0 };

        Self {
            audio_url: audio_url.to_string(),
            model: model.to_string(),
            two_stems,
            overlap: OVERLAP,
            shifts,
            audio_format: OUTPUT_FORMAT.to_string(),
        }
    }
}

/// One output track as the engine reports it. Loosely typed on purpose; the
/// engine has shipped payloads with and without names and indices.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EngineOutputFile {
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default)]
    pub stem_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// How a submit call was answered.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The engine ran the separation inline and returned the outputs.
    Completed { output_files: Vec<EngineOutputFile> },
    /// The engine queued the work and handed back a handle to poll.
    Accepted { engine_job_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineJobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl EngineJobState {
    /// Maps the engine's status vocabulary onto ours. Unknown strings are
    /// treated as still-processing so polling continues.
    pub fn from_engine(value: &str) -> Self {
        match value {
            "queued" | "pending" => EngineJobState::Queued,
            "processing" | "running" | "started" => EngineJobState::Processing,
            "completed" | "finished" | "succeeded" => EngineJobState::Completed,
            "failed" | "error" | "cancelled" => EngineJobState::Failed,
            _ => EngineJobState::Processing,
        }
    }
}

/// Snapshot of an asynchronous engine job.
#[derive(Debug, Clone)]
pub struct EngineJobStatus {
    pub state: EngineJobState,
    pub progress: Option<i32>,
    pub output_files: Vec<EngineOutputFile>,
    pub error: Option<String>,
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait SeparationEngineClient: Send + Sync {
    async fn submit(&self, request: SubmitRequest) -> Result<DispatchOutcome>;

    async fn fetch_status(&self, engine_job_id: &str) -> Result<EngineJobStatus>;
}

/// Positional stem name for an unnamed output, derived from the selection
/// the job was planned with. Two-stem runs produce the isolated stem and its
/// complement; full runs follow the model's fixed track order.
pub fn fallback_stem_name(index: usize, selected: &[StemKind]) -> String {
    if let [only] = selected {
        return if index == 0 {
            only.to_string()
        } else {
            format!("no_{}", only)
        };
    }

    const FOUR_STEM_ORDER: [&str; 4] = ["vocals", "drums", "bass", "other"];
    const SIX_STEM_ORDER: [&str; 6] = ["vocals", "drums", "bass", "other", "guitar", "piano"];

    let order: &[&str] = if selected.iter().any(|stem| stem.requires_six_stem_model()) {
        &SIX_STEM_ORDER
    } else {
        &FOUR_STEM_ORDER
    };

    match order.get(index) {
        Some(name) => (*name).to_string(),
        None => format!("stem_{}", index),
    }
}

/// Turns raw engine outputs into the result files stored on the job row.
/// Outputs the engine reported without a URL are dropped.
pub fn normalize_output_files(
    files: &[EngineOutputFile],
    selected: &[StemKind],
) -> Vec<ResultFile> {
    let mut result_files = Vec::with_capacity(files.len());

    for (position, file) in files.iter().enumerate() {
        let Some(url) = file.url.clone() else {
            warn!(position, "engine: output file has no url, dropping");
            continue;
        };

        let index = file
            .index
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(position);
        let stem_name = match file.stem_name.clone() {
            Some(name) => name,
            None => fallback_stem_name(index, selected),
        };

        result_files.push(ResultFile { stem_name, url });
    }

    result_files
}
