pub mod audio_files;
pub mod credit_transactions;
pub mod separation_jobs;
pub mod usage_stats;
pub mod user_accounts;
