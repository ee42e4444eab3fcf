pub mod detector;
pub mod ports;
pub mod queue;
pub mod redis;
pub mod source;
pub mod storage;
