pub mod job_statuses;
pub mod quality_tiers;
pub mod stems;
pub mod subscription_tiers;
