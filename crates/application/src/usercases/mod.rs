pub mod credit_accounts;
pub mod credit_cost;
pub mod entitlements;
pub mod separation_job;
pub mod usage_tracking;
