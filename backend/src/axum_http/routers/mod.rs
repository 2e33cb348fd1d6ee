pub mod credits;
pub mod separations;
