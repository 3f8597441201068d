//! SQLite-backed watch-list store.
//!
//! A single `rusqlite::Connection` behind a mutex; the `watches` table
//! holds one row per directed edge with a primary key over the pair, so
//! inserts are naturally idempotent.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use tryst_shared::Identity;

use crate::migrations;
use crate::provider::{check_identity, WatchListStore};
use crate::{Result, StoreError};

/// [`WatchListStore`] persisted to a SQLite database file.
pub struct SqliteWatchListStore {
    conn: Mutex<Connection>,
}

impl SqliteWatchListStore {
    /// Open (or create) a store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening watch-list database");
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store. Useful for tests; nothing survives the
    /// process.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn column_set(&self, sql: &str, key: &Identity) -> Result<BTreeSet<Identity>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare_cached(sql)?;

        let rows = stmt.query_map(params![key.as_str()], |row| row.get::<_, String>(0))?;

        let mut out = BTreeSet::new();
        for row in rows {
            let raw = row?;
            let identity = Identity::new(raw)
                .map_err(|_| StoreError::InvalidArgument("empty identity row in watches"))?;
            out.insert(identity);
        }
        Ok(out)
    }
}

impl WatchListStore for SqliteWatchListStore {
    fn add(&self, owner: &Identity, target: &Identity) -> Result<()> {
        check_identity(owner)?;
        check_identity(target)?;

        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO watches (owner, target) VALUES (?1, ?2)",
            params![owner.as_str(), target.as_str()],
        )?;
        Ok(())
    }

    fn add_range(&self, owner: &Identity, targets: &[Identity]) -> Result<()> {
        check_identity(owner)?;
        for target in targets {
            check_identity(target)?;
        }

        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;
        for target in targets {
            tx.execute(
                "INSERT OR IGNORE INTO watches (owner, target) VALUES (?1, ?2)",
                params![owner.as_str(), target.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, owner: &Identity, target: &Identity) -> Result<()> {
        check_identity(owner)?;
        check_identity(target)?;

        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "DELETE FROM watches WHERE owner = ?1 AND target = ?2",
            params![owner.as_str(), target.as_str()],
        )?;
        Ok(())
    }

    fn clear(&self, owner: &Identity) -> Result<()> {
        check_identity(owner)?;

        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "DELETE FROM watches WHERE owner = ?1",
            params![owner.as_str()],
        )?;
        Ok(())
    }

    fn get_watched(&self, owner: &Identity) -> Result<BTreeSet<Identity>> {
        check_identity(owner)?;
        self.column_set("SELECT target FROM watches WHERE owner = ?1", owner)
    }

    fn get_watchers(&self, target: &Identity) -> Result<BTreeSet<Identity>> {
        check_identity(target)?;
        self.column_set("SELECT owner FROM watches WHERE target = ?1", target)
    }

    fn is_watcher(&self, owner: &Identity, target: &Identity) -> Result<bool> {
        check_identity(owner)?;
        check_identity(target)?;

        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt =
            conn.prepare_cached("SELECT 1 FROM watches WHERE owner = ?1 AND target = ?2")?;
        Ok(stmt.exists(params![owner.as_str(), target.as_str()])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[test]
    fn test_open_at_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watches.db");

        {
            let store = SqliteWatchListStore::open_at(&path).unwrap();
            store.add(&id("alice"), &id("bob")).unwrap();
        }

        let store = SqliteWatchListStore::open_at(&path).unwrap();
        assert!(store.is_watcher(&id("alice"), &id("bob")).unwrap());
    }

    #[test]
    fn test_round_trip() {
        let store = SqliteWatchListStore::open_in_memory().unwrap();
        store
            .add_range(&id("alice"), &[id("bob"), id("carol")])
            .unwrap();

        assert_eq!(
            store.get_watched(&id("alice")).unwrap(),
            [id("bob"), id("carol")].into_iter().collect()
        );

        store.remove(&id("alice"), &id("bob")).unwrap();
        assert_eq!(
            store.get_watched(&id("alice")).unwrap(),
            [id("carol")].into_iter().collect()
        );
    }

    #[test]
    fn test_inverse_lookup() {
        let store = SqliteWatchListStore::open_in_memory().unwrap();
        store.add(&id("alice"), &id("carol")).unwrap();
        store.add(&id("bob"), &id("carol")).unwrap();

        assert_eq!(
            store.get_watchers(&id("carol")).unwrap(),
            [id("alice"), id("bob")].into_iter().collect()
        );
    }

    #[test]
    fn test_clear() {
        let store = SqliteWatchListStore::open_in_memory().unwrap();
        store
            .add_range(&id("alice"), &[id("bob"), id("carol")])
            .unwrap();
        store.clear(&id("alice")).unwrap();

        assert!(store.get_watched(&id("alice")).unwrap().is_empty());
        assert!(store.get_watchers(&id("bob")).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_add_is_ignored() {
        let store = SqliteWatchListStore::open_in_memory().unwrap();
        store.add(&id("alice"), &id("bob")).unwrap();
        store.add(&id("alice"), &id("bob")).unwrap();

        assert_eq!(store.get_watched(&id("alice")).unwrap().len(), 1);
    }
}
