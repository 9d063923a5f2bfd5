#[macro_use]
mod macros;

pub mod redis;
pub mod store;
pub mod tiered;

pub use self::redis::{create_redis_client, RedisStore, StoreWriterHandle};
pub use store::{load_record, save_record, InMemoryStore, PersistentStore, StoreKey};
pub use tiered::{CacheStats, TieredCache};
