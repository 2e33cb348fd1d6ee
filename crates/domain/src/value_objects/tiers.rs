use crate::value_objects::enums::subscription_tiers::SubscriptionTier;

/// Limits and feature flags attached to a subscription tier. `None` caps are
/// unlimited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierFeatures {
    pub monthly_credits: f64,
    pub monthly_minutes: Option<f64>,
    pub monthly_separations: Option<i64>,
    pub max_upload_mb: i64,
    pub pro_quality: bool,
    pub extended_stems: bool,
}

impl SubscriptionTier {
    pub fn features(&self) -> TierFeatures {
        match self {
            SubscriptionTier::Free => TierFeatures {
                monthly_credits: 10.0,
                monthly_minutes: Some(30.0),
                monthly_separations: Some(10),
                max_upload_mb: 25,
                pro_quality: false,
                extended_stems: false,
            },
            SubscriptionTier::Creator => TierFeatures {
                monthly_credits: 200.0,
                monthly_minutes: Some(300.0),
                monthly_separations: Some(200),
                max_upload_mb: 100,
                pro_quality: true,
                extended_stems: true,
            },
            SubscriptionTier::Studio => TierFeatures {
                monthly_credits: 1000.0,
                monthly_minutes: None,
                monthly_separations: None,
                max_upload_mb: 500,
                pro_quality: true,
                extended_stems: true,
            },
        }
    }
}
