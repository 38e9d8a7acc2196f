pub mod contracts;
pub mod encoder;
pub mod queue;
pub mod search;
pub mod storage;
pub mod workers_ai;
