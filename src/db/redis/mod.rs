pub mod cache;

pub use cache::create_redis_client;
pub use cache::RedisStore;
pub use cache::StoreWriterHandle;
pub use cache::DEFAULT_RETENTION_SECS;
