use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::usage_stats;

/// Per-user monthly aggregate, keyed by (user_id, period_month).
#[derive(Debug, Clone, Selectable, Queryable)]
#[diesel(table_name = usage_stats)]
pub struct UsageStatsEntity {
    pub user_id: Uuid,
    pub period_month: String,
    pub minutes_processed: f64,
    pub separations_performed: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = usage_stats)]
pub struct InsertUsageStatsEntity {
    pub user_id: Uuid,
    pub period_month: String,
    pub minutes_processed: f64,
    pub separations_performed: i64,
    pub updated_at: DateTime<Utc>,
}
