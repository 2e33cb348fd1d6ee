pub mod separation_engine;
pub mod storage;
