//! Redis connection handling shared by the directory backend and the
//! delivery transport.

pub mod pool;

pub use pool::RedisPool;
