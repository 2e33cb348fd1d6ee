pub mod enums;
pub mod ledger;
pub mod separation_jobs;
pub mod tiers;
