use domain::value_objects::enums::quality_tiers::QualityTier;

/// Price of isolating one stem from one minute of audio.
pub const CREDITS_PER_STEM_MINUTE: f64 = 0.8;

/// Surcharge for the fine-tuned pro model.
pub const PRO_QUALITY_MULTIPLIER: f64 = 1.5;

/// Shortest duration a separation is metered as, in minutes. Applies to
/// usage recording only, never to cost.
pub const MIN_BILLABLE_MINUTES: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBreakdown {
    pub base_cost: f64,
    pub model_multiplier: f64,
    pub total_cost: f64,
}

/// Projects the credit cost of a separation. Pure: same inputs, same
/// breakdown. The total is intentionally unrounded; rounding happens once,
/// at the ledger deduction.
pub fn estimate(stem_count: usize, duration_minutes: f64, quality: QualityTier) -> CostBreakdown {
    let minutes = duration_minutes.max(0.0);
    let base_cost = stem_count as f64 * minutes * CREDITS_PER_STEM_MINUTE;
    let model_multiplier = match quality {
        QualityTier::Standard => 1.0,
        QualityTier::Pro => PRO_QUALITY_MULTIPLIER,
    };

    CostBreakdown {
        base_cost,
        model_multiplier,
        total_cost: base_cost * model_multiplier,
    }
}

/// Unrounded duration in minutes, for cost projection.
pub fn exact_minutes(duration_seconds: f64) -> f64 {
    duration_seconds.max(0.0) / 60.0
}

/// Duration in minutes as metered for usage stats, floored at
/// [`MIN_BILLABLE_MINUTES`].
pub fn usage_minutes(duration_seconds: f64) -> f64 {
    exact_minutes(duration_seconds).max(MIN_BILLABLE_MINUTES)
}

/// Rounds a credit amount to two decimal places.
pub fn round_credits(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
