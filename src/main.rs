//! smallcap-sync - headless sync client
//!
//! Mounts the watchlist and the triggered-alerts inbox against the
//! configured API and logs every change until Ctrl-C.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use smallcap_sync::api::{ApiClient, AuthTokenProvider, RemoteApi, StaticToken};
use smallcap_sync::config::Config;
use smallcap_sync::repository::{TriggeredAlertsRepository, WatchlistRepository};
use smallcap_sync::{CacheStore, ResourceKey, SyncContext};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("smallcap_sync=info,reqwest=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting smallcap-sync...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    info!("API: {}", config.api_base_url);

    if config.api_token.is_none() {
        warn!("API_TOKEN is not set, requests go out unauthenticated");
    }

    let auth: Arc<dyn AuthTokenProvider> = Arc::new(StaticToken::new(config.api_token.clone()));
    let api: Arc<dyn RemoteApi> = Arc::new(ApiClient::new(config.api_base_url.clone(), auth)?);

    let ctx = SyncContext::new(&config.sync);
    info!("Sync context initialized");

    let watchlist = WatchlistRepository::new(&ctx, Arc::clone(&api));
    let inbox = TriggeredAlertsRepository::new(&ctx, Arc::clone(&api), config.alerts_poll_interval);

    if let Some(every) = config.alerts_poll_interval {
        info!("Polling triggered alerts every {:?}", every);
    }

    let store = ctx.store.clone();
    let _watchlist = watchlist.mount(move |key| log_change(&store, key));
    let store = ctx.store.clone();
    let _inbox = inbox.mount(move |key| log_change(&store, key));

    info!("Resources mounted, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    Ok(())
}

fn log_change(store: &CacheStore, key: &ResourceKey) {
    let entry = store.get(key);
    match (&entry.error, &entry.data) {
        (Some(err), _) => error!("{} failed: {}", key, err),
        (None, Some(_)) => info!(
            "{} updated (revision {}, fetched {:?})",
            key, entry.revision, entry.fetched_at
        ),
        (None, None) => info!("{} cleared", key),
    }
}
