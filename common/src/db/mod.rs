// Connection pools: PostgreSQL for entity storage, Redis for the run lock

pub mod pool;
pub mod redis;

pub use pool::DbPool;
pub use redis::RedisPool;
