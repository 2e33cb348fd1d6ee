use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::user_accounts;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = user_accounts)]
pub struct UserAccountEntity {
    pub id: Uuid,
    pub subscription_tier: String,
    pub credits_total: f64,
    pub credits_remaining: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_accounts)]
pub struct InsertUserAccountEntity {
    pub id: Uuid,
    pub subscription_tier: String,
    pub credits_total: f64,
    pub credits_remaining: f64,
}
