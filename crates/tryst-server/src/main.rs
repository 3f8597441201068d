//! # tryst-server binary
//!
//! Rendezvous server for the Tryst network: presence, watch-lists,
//! groups, invitations, connection brokering and opaque relay.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tryst_server::identity::PinningResolver;
use tryst_server::transport::RendezvousListener;
use tryst_server::{Router, ServerConfig};
use tryst_store::{MemoryWatchListStore, SqliteWatchListStore, WatchListStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tryst_server=debug")),
        )
        .init();

    info!("Starting Tryst rendezvous server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let store: Arc<dyn WatchListStore> = match &config.watchlist_db {
        Some(path) => Arc::new(SqliteWatchListStore::open_at(path)?),
        None => {
            info!("No TRYST_WATCHLIST_DB set; watch-lists are in-memory only");
            Arc::new(MemoryWatchListStore::new())
        }
    };

    // Trust-on-first-use resolution; production deployments plug in a
    // real authentication-backed resolver here.
    let resolver = Arc::new(PinningResolver::new());

    let router = Arc::new(Router::new(store, resolver));
    let listener = RendezvousListener::bind(router, &config).await?;

    tokio::select! {
        result = listener.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "listener failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
