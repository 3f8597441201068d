//! Database migration runner.
//!
//! Migrations run on every open. Each one is guarded by the
//! `user_version` pragma so it applies exactly once per database file.

pub mod v001_watches;

use rusqlite::Connection;

use crate::{Result, StoreError};

/// Current schema version. Bump this and add a new migration module
/// whenever the schema changes.
const CURRENT_VERSION: u32 = 1;

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::debug!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking watch-list schema"
    );

    if current < 1 {
        tracing::info!("applying migration v001_watches");
        v001_watches::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    Ok(())
}
