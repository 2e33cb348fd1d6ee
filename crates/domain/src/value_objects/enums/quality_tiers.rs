use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Standard,
    Pro,
}

impl Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let quality = match self {
            QualityTier::Standard => "standard",
            QualityTier::Pro => "pro",
        };
        write!(f, "{}", quality)
    }
}

impl QualityTier {
    pub fn from_str(value: &str) -> Self {
        match value {
            "standard" => QualityTier::Standard,
            "pro" => QualityTier::Pro,
            _ => QualityTier::Standard,
        }
    }
}
