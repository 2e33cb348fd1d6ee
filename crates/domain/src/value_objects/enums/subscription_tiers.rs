use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Creator,
    Studio,
}

impl Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tier = match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Creator => "creator",
            SubscriptionTier::Studio => "studio",
        };
        write!(f, "{}", tier)
    }
}

impl SubscriptionTier {
    pub fn from_str(value: &str) -> Self {
        match value {
            "free" => SubscriptionTier::Free,
            "creator" => SubscriptionTier::Creator,
            "studio" => SubscriptionTier::Studio,
            _ => SubscriptionTier::Free,
        }
    }
}
