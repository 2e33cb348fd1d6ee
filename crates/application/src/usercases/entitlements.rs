use std::sync::Arc;

use chrono::Utc;
use domain::{
    repositories::{usage_stats::UsageStatsRepository, user_account::UserAccountRepository},
    value_objects::enums::{
        quality_tiers::QualityTier, stems::StemKind, subscription_tiers::SubscriptionTier,
    },
};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::usercases::{credit_cost, usage_tracking};

/// What a prospective job asks for, before any row exists.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub stems: Vec<StemKind>,
    pub quality: QualityTier,
    pub duration_seconds: Option<f64>,
    pub size_bytes: Option<i64>,
}

/// Proof that the request cleared every gate, with the tier and projected
/// cost it was approved at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entitlement {
    pub tier: SubscriptionTier,
    pub cost: f64,
    pub credits_remaining: f64,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no account exists for this user")]
    UnknownUser,
    #[error("audio duration is missing or not positive")]
    InvalidDuration,
    #[error("at least one stem must be selected")]
    EmptyStemSelection,
    #[error("not available on the {tier} tier: {feature}")]
    TierRestricted {
        tier: SubscriptionTier,
        feature: String,
    },
    #[error("file exceeds the {limit_mb} MB upload limit")]
    FileTooLarge { limit_mb: i64 },
    #[error("monthly usage cap exceeded: {0}")]
    UsageCapExceeded(String),
    #[error("insufficient credits: need {required}, have {remaining}")]
    InsufficientCredits { required: f64, remaining: f64 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ValidationError {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            ValidationError::UnknownUser => StatusCode::NOT_FOUND,
            ValidationError::InvalidDuration | ValidationError::EmptyStemSelection => {
                StatusCode::BAD_REQUEST
            }
            ValidationError::TierRestricted { .. } => StatusCode::FORBIDDEN,
            ValidationError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ValidationError::UsageCapExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ValidationError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            ValidationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Read-only eligibility check run before any job row or external work
/// exists. Never mutates ledger, usage, or job state.
pub struct EntitlementValidator<A, U>
where
    A: UserAccountRepository + Send + Sync + 'static,
    U: UsageStatsRepository + Send + Sync + 'static,
{
    account_repo: Arc<A>,
    usage_repo: Arc<U>,
}

impl<A, U> EntitlementValidator<A, U>
where
    A: UserAccountRepository + Send + Sync + 'static,
    U: UsageStatsRepository + Send + Sync + 'static,
{
    pub fn new(account_repo: Arc<A>, usage_repo: Arc<U>) -> Self {
        Self {
            account_repo,
            usage_repo,
        }
    }

    pub async fn validate(
        &self,
        user_id: Uuid,
        request: &JobRequest,
    ) -> Result<Entitlement, ValidationError> {
        let duration_seconds = match request.duration_seconds {
            Some(value) if value > 0.0 => value,
            _ => {
                warn!(%user_id, "entitlements: rejected job with unusable duration");
                return Err(ValidationError::InvalidDuration);
            }
        };

        if request.stems.is_empty() {
            warn!(%user_id, "entitlements: rejected job with empty stem selection");
            return Err(ValidationError::EmptyStemSelection);
        }

        let account = self
            .account_repo
            .find_by_id(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "entitlements: failed to load account");
                ValidationError::Internal(err)
            })?
            .ok_or(ValidationError::UnknownUser)?;

        let tier = SubscriptionTier::from_str(&account.subscription_tier);
        let features = tier.features();

        if request.quality == QualityTier::Pro && !features.pro_quality {
            return Err(ValidationError::TierRestricted {
                tier,
                feature: "pro quality".to_string(),
            });
        }

        if !features.extended_stems {
            if let Some(stem) = request
                .stems
                .iter()
                .find(|stem| stem.requires_six_stem_model())
            {
                return Err(ValidationError::TierRestricted {
                    tier,
                    feature: format!("{} stem", stem),
                });
            }
        }

        if let Some(size_bytes) = request.size_bytes {
            let limit_bytes = features.max_upload_mb * 1024 * 1024;
            if size_bytes > limit_bytes {
                return Err(ValidationError::FileTooLarge {
                    limit_mb: features.max_upload_mb,
                });
            }
        }

        let period = usage_tracking::period_month(Utc::now());
        let usage = self
            .usage_repo
            .find(user_id, &period)
            .await
            .map_err(|err| {
                error!(%user_id, period = %period, db_error = ?err, "entitlements: failed to load usage stats");
                ValidationError::Internal(err)
            })?;

        // No row yet means nothing was processed this month.
        let (minutes_used, separations_done) = usage
            .map(|row| (row.minutes_processed, row.separations_performed))
            .unwrap_or((0.0, 0));

        if let Some(cap) = features.monthly_minutes {
            let projected = minutes_used + credit_cost::usage_minutes(duration_seconds);
            if projected > cap {
                return Err(ValidationError::UsageCapExceeded(format!(
                    "{:.1} of {:.1} minutes",
                    minutes_used, cap
                )));
            }
        }

        if let Some(cap) = features.monthly_separations {
            if separations_done + 1 > cap {
                return Err(ValidationError::UsageCapExceeded(format!(
                    "{} of {} separations",
                    separations_done, cap
                )));
            }
        }

        let breakdown = credit_cost::estimate(
            request.stems.len(),
            credit_cost::exact_minutes(duration_seconds),
            request.quality,
        );
        let required = credit_cost::round_credits(breakdown.total_cost);
        if required > account.credits_remaining {
            return Err(ValidationError::InsufficientCredits {
                required,
                remaining: account.credits_remaining,
            });
        }

        debug!(
            %user_id,
            tier = %tier,
            cost = breakdown.total_cost,
            credits_remaining = account.credits_remaining,
            "entitlements: job request validated"
        );

        Ok(Entitlement {
            tier,
            cost: breakdown.total_cost,
            credits_remaining: account.credits_remaining,
        })
    }
}
