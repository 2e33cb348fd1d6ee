pub mod interfaces;
pub mod usercases;
