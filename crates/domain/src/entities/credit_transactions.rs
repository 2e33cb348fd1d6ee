use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::credit_transactions;

/// Ledger row. Positive amounts are grants, negative amounts are deductions.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = credit_transactions)]
pub struct CreditTransactionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: f64,
    pub job_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = credit_transactions)]
pub struct InsertCreditTransactionEntity {
    pub user_id: Uuid,
    pub amount: f64,
    pub job_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
