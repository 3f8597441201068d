//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the rendezvous listener.
    /// Env: `TRYST_LISTEN`
    /// Default: `0.0.0.0:42920`
    pub listen_addr: SocketAddr,

    /// Path of the SQLite watch-list database. When unset the server
    /// keeps watch-lists in memory and asks clients to replay their
    /// lists on every join.
    /// Env: `TRYST_WATCHLIST_DB`
    /// Default: unset (in-memory)
    pub watchlist_db: Option<PathBuf>,

    /// Maximum inbound frame size in bytes.
    /// Env: `TRYST_MAX_FRAME`
    /// Default: 256 KiB
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], 42920).into(),
            watchlist_db: None,
            max_frame_size: 256 * 1024,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("TRYST_LISTEN") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.listen_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid TRYST_LISTEN, using default");
            }
        }

        if let Ok(path) = std::env::var("TRYST_WATCHLIST_DB") {
            if !path.is_empty() {
                config.watchlist_db = Some(PathBuf::from(path));
            }
        }

        if let Ok(val) = std::env::var("TRYST_MAX_FRAME") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_frame_size = n;
            } else {
                tracing::warn!(value = %val, "Invalid TRYST_MAX_FRAME, using default");
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, ([0, 0, 0, 0], 42920).into());
        assert!(config.watchlist_db.is_none());
        assert_eq!(config.max_frame_size, 256 * 1024);
    }
}
