pub mod engines;
pub mod postgres;
pub mod storages;
