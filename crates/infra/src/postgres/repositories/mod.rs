pub mod audio_file;
pub mod credit_ledger;
pub mod separation_job;
pub mod usage_stats;
pub mod user_account;
