use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Instrument/vocal tracks the separation engine can isolate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StemKind {
    Vocals,
    Drums,
    Bass,
    Other,
    Guitar,
    Piano,
}

impl Display for StemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stem = match self {
            StemKind::Vocals => "vocals",
            StemKind::Drums => "drums",
            StemKind::Bass => "bass",
            StemKind::Other => "other",
            StemKind::Guitar => "guitar",
            StemKind::Piano => "piano",
        };
        write!(f, "{}", stem)
    }
}

impl StemKind {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "vocals" => Some(StemKind::Vocals),
            "drums" => Some(StemKind::Drums),
            "bass" => Some(StemKind::Bass),
            "other" => Some(StemKind::Other),
            "guitar" => Some(StemKind::Guitar),
            "piano" => Some(StemKind::Piano),
            _ => None,
        }
    }

    /// Guitar and piano only exist in the six-stem model family.
    pub fn requires_six_stem_model(&self) -> bool {
        matches!(self, StemKind::Guitar | StemKind::Piano)
    }
}
