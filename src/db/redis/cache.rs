use redis::AsyncCommands;
use redis::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::store::{PersistentStore, StoreKey};
use crate::error::AppResult;

/// Prefix applied to every key this crate writes
const KEY_PREFIX: &str = "reelcache";

/// Seconds a record is retained in Redis. Analysis records are the longest
/// lived at 180 days; anything older is never served anyway.
pub const DEFAULT_RETENTION_SECS: u64 = 180 * 24 * 60 * 60;

/// Creates a Redis client for the durable tier
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

fn redis_key(key: &StoreKey) -> String {
    format!("{}:{}", KEY_PREFIX, key)
}

/// Message for asynchronous record writes
struct StoreWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Durable store backed by Redis.
///
/// Reads and deletes go straight to Redis. Writes are handed to a background
/// task so persisting a record never delays the response that produced it.
#[derive(Clone)]
pub struct RedisStore {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<StoreWriteMessage>,
    retention_secs: u64,
}

/// Handle for gracefully shutting down the store writer
pub struct StoreWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl StoreWriterHandle {
    /// Signals the writer task to flush pending writes and waits for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Store writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Store writer task failed");
        }
    }
}

impl RedisStore {
    /// Creates the store and spawns its background writer.
    pub fn new(redis_client: Client, retention_secs: u64) -> (Self, StoreWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        let task = tokio::spawn(async move {
            Self::store_writer_task(client, write_rx, shutdown_rx).await;
        });

        let store = Self {
            redis_client,
            write_tx,
            retention_secs,
        };

        (store, StoreWriterHandle { shutdown_tx, task })
    }

    async fn store_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<StoreWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Store writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    let key = msg.key.clone();
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::warn!(error = %e, key = %key, "Failed to persist record");
                    }
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    tracing::info!("Store writer shutting down, flushing remaining writes");

                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush record during shutdown");
                        }
                    }

                    tracing::info!("Store writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(client: &Client, msg: StoreWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PersistentStore for RedisStore {
    async fn get(&self, key: &StoreKey) -> AppResult<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(redis_key(key)).await?;
        Ok(value)
    }

    /// Queues the write and returns immediately.
    async fn put(&self, key: &StoreKey, value: String) -> AppResult<()> {
        let msg = StoreWriteMessage {
            key: redis_key(key),
            value,
            ttl: self.retention_secs,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to queue record write");
        }
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> AppResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(redis_key(key)).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
