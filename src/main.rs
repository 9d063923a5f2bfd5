use std::sync::Arc;

use reelcache::{
    config::Config,
    db::{
        create_redis_client, redis::DEFAULT_RETENTION_SECS, InMemoryStore, PersistentStore,
        RedisStore, StoreWriterHandle,
    },
    routes::{create_router, AppState},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reelcache=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (store, writer): (Arc<dyn PersistentStore>, Option<StoreWriterHandle>) =
        match config.redis_url.as_deref() {
            Some(url) => {
                let (store, writer) = RedisStore::new(create_redis_client(url)?, DEFAULT_RETENTION_SECS);
                (Arc::new(store), Some(writer))
            }
            None => {
                tracing::warn!("REDIS_URL not set, records will not survive a restart");
                (Arc::new(InMemoryStore::new()), None)
            }
        };

    let (state, lifecycle_listener) = AppState::from_config(&config, store)?;
    let app = create_router(state.clone());

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(%address, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.dispose();
    if let Some(writer) = writer {
        writer.shutdown().await;
    }
    lifecycle_listener.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
