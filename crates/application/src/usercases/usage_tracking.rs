use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::repositories::usage_stats::UsageStatsRepository;
use tracing::{debug, error};
use uuid::Uuid;

use crate::usercases::credit_cost;

/// Month bucket key for usage aggregates, e.g. "2026-08".
pub fn period_month(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Records separation usage into the per-user monthly aggregate.
///
/// Usage metering is best effort: a failed write is reported through the
/// error log and otherwise swallowed, so it can never fail a job or a
/// charge.
pub struct UsageRecorder<U>
where
    U: UsageStatsRepository + Send + Sync + 'static,
{
    usage_repo: Arc<U>,
}

impl<U> UsageRecorder<U>
where
    U: UsageStatsRepository + Send + Sync + 'static,
{
    pub fn new(usage_repo: Arc<U>) -> Self {
        Self { usage_repo }
    }

    pub async fn record_separation(&self, user_id: Uuid, duration_seconds: f64) {
        let minutes = credit_cost::usage_minutes(duration_seconds);
        let period = period_month(Utc::now());

        match self
            .usage_repo
            .increment(user_id, &period, minutes)
            .await
        {
            Ok(()) => {
                debug!(%user_id, period = %period, minutes, "usage: separation recorded");
            }
            Err(err) => {
                error!(
                    %user_id,
                    period = %period,
                    minutes,
                    db_error = ?err,
                    "usage: failed to record separation usage"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use domain::repositories::usage_stats::MockUsageStatsRepository;

    #[test]
    fn period_month_formats_year_and_month() {
        let at = Utc.with_ymd_and_hms(2026, 8, 3, 10, 30, 0).unwrap();
        assert_eq!(period_month(at), "2026-08");
    }

    #[tokio::test]
    async fn records_floored_minutes_for_tiny_clips() {
        let user_id = Uuid::new_v4();
        let mut usage_repo = MockUsageStatsRepository::new();

        usage_repo
            .expect_increment()
            .withf(move |uid, _period, minutes| {
                *uid == user_id && (*minutes - credit_cost::MIN_BILLABLE_MINUTES).abs() < 1e-9
            })
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let recorder = UsageRecorder::new(Arc::new(usage_repo));
        recorder.record_separation(user_id, 2.0).await;
    }

    #[tokio::test]
    async fn swallows_repository_failures() {
        let user_id = Uuid::new_v4();
        let mut usage_repo = MockUsageStatsRepository::new();

        usage_repo
            .expect_increment()
            .returning(|_, _, _| Box::pin(async { Err(anyhow!("usage_stats is unreachable")) }));

        let recorder = UsageRecorder::new(Arc::new(usage_repo));
        recorder.record_separation(user_id, 300.0).await;
    }
}
