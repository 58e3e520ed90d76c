//! Resource Watch API server binary.
//!
//! Serves watch sessions over WebSocket for a demo `widgets` resource type
//! backed by an in-memory store.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use resource_watch_api::{
    AllowAll, AppState, EventName, MemoryStore, Schema, Schemas, Server, ServerConfig,
    WatchConfig, WatchContext,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,resource_watch_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env_or("API_PORT", 8080)?;
    let watch = WatchConfig::default()
        .with_debounce_interval(env_or("WATCH_DEBOUNCE_MS", 1000)?)
        .with_max_session(env_or("WATCH_MAX_SESSION_SECS", 30 * 60)?)
        .with_outbound_buffer(env_or("WATCH_OUTBOUND_BUFFER", 100)?)
        .with_metrics(env_or("WATCH_METRICS", true)?);
    watch.validate().context("invalid watch configuration")?;
    let demo_interval_ms: u64 = env_or("WATCH_DEMO_INTERVAL_MS", 0)?;

    let widgets = Arc::new(MemoryStore::new("widgets"));
    let schemas = Schemas::new().with(Schema::watchable(
        "widgets",
        Arc::<MemoryStore>::clone(&widgets),
    ));
    let context = WatchContext::new(Arc::new(schemas), Arc::new(AllowAll), watch);

    let config = ServerConfig::new(host, port);
    let state = AppState::new(context);

    if demo_interval_ms > 0 {
        tokio::spawn(publish_demo_changes(
            widgets,
            Duration::from_millis(demo_interval_ms),
            state.shutdown.clone(),
        ));
    }

    tracing::info!(
        "Starting Resource Watch API server on {}:{}",
        config.host,
        config.port
    );

    let server = Server::new(config, state);
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .context("server failed")?;

    tracing::info!("Resource Watch API server stopped");
    Ok(())
}

/// Reads an environment variable, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

/// Publishes a change to widget `w1` on every tick until shutdown.
async fn publish_demo_changes(store: Arc<MemoryStore>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    let mut size: u64 = 0;

    store.publish(EventName::Create, Some("default"), "w1", json!({ "size": size }));
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                size += 1;
                let revision = store.publish(
                    EventName::Change,
                    Some("default"),
                    "w1",
                    json!({ "size": size, "metadata": { "labels": { "app": "demo" } } }),
                );
                tracing::debug!(revision = %revision, "published demo change");
            }
        }
    }
}
