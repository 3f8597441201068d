//! In-memory watch-list store.
//!
//! Keeps the forward relation and its inverse as two maps under one
//! mutex so both lookup directions are a single hash probe.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use tryst_shared::Identity;

use crate::provider::{check_identity, WatchListStore};
use crate::Result;

#[derive(Default)]
struct Inner {
    /// owner -> targets the owner watches
    watched: HashMap<Identity, BTreeSet<Identity>>,
    /// target -> owners watching the target
    watchers: HashMap<Identity, BTreeSet<Identity>>,
}

impl Inner {
    fn insert(&mut self, owner: &Identity, target: &Identity) {
        self.watched
            .entry(owner.clone())
            .or_default()
            .insert(target.clone());
        self.watchers
            .entry(target.clone())
            .or_default()
            .insert(owner.clone());
    }
}

/// Reference [`WatchListStore`] backed by process memory.
#[derive(Default)]
pub struct MemoryWatchListStore {
    inner: Mutex<Inner>,
}

impl MemoryWatchListStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatchListStore for MemoryWatchListStore {
    fn add(&self, owner: &Identity, target: &Identity) -> Result<()> {
        check_identity(owner)?;
        check_identity(target)?;

        let mut inner = self.inner.lock().expect("watch-list lock poisoned");
        inner.insert(owner, target);
        Ok(())
    }

    fn add_range(&self, owner: &Identity, targets: &[Identity]) -> Result<()> {
        check_identity(owner)?;
        for target in targets {
            check_identity(target)?;
        }

        let mut inner = self.inner.lock().expect("watch-list lock poisoned");
        for target in targets {
            inner.insert(owner, target);
        }
        Ok(())
    }

    fn remove(&self, owner: &Identity, target: &Identity) -> Result<()> {
        check_identity(owner)?;
        check_identity(target)?;

        let mut inner = self.inner.lock().expect("watch-list lock poisoned");
        if let Some(targets) = inner.watched.get_mut(owner) {
            targets.remove(target);
        }
        if let Some(owners) = inner.watchers.get_mut(target) {
            owners.remove(owner);
        }
        Ok(())
    }

    fn clear(&self, owner: &Identity) -> Result<()> {
        check_identity(owner)?;

        let mut inner = self.inner.lock().expect("watch-list lock poisoned");
        if let Some(targets) = inner.watched.remove(owner) {
            for target in targets {
                if let Some(owners) = inner.watchers.get_mut(&target) {
                    owners.remove(owner);
                }
            }
        }
        Ok(())
    }

    fn get_watched(&self, owner: &Identity) -> Result<BTreeSet<Identity>> {
        check_identity(owner)?;

        let inner = self.inner.lock().expect("watch-list lock poisoned");
        Ok(inner.watched.get(owner).cloned().unwrap_or_default())
    }

    fn get_watchers(&self, target: &Identity) -> Result<BTreeSet<Identity>> {
        check_identity(target)?;

        let inner = self.inner.lock().expect("watch-list lock poisoned");
        Ok(inner.watchers.get(target).cloned().unwrap_or_default())
    }

    fn is_watcher(&self, owner: &Identity, target: &Identity) -> Result<bool> {
        check_identity(owner)?;
        check_identity(target)?;

        let inner = self.inner.lock().expect("watch-list lock poisoned");
        Ok(inner
            .watched
            .get(owner)
            .map(|targets| targets.contains(target))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    #[test]
    fn test_add_then_get_watched() {
        let store = MemoryWatchListStore::new();
        store
            .add_range(&id("alice"), &[id("bob"), id("carol")])
            .unwrap();

        let watched = store.get_watched(&id("alice")).unwrap();
        assert_eq!(watched, [id("bob"), id("carol")].into_iter().collect());

        store.remove(&id("alice"), &id("bob")).unwrap();
        let watched = store.get_watched(&id("alice")).unwrap();
        assert_eq!(watched, [id("carol")].into_iter().collect());
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = MemoryWatchListStore::new();
        store.add(&id("alice"), &id("bob")).unwrap();
        store.add(&id("alice"), &id("bob")).unwrap();

        assert_eq!(store.get_watched(&id("alice")).unwrap().len(), 1);
        assert_eq!(store.get_watchers(&id("bob")).unwrap().len(), 1);
    }

    #[test]
    fn test_watchers_is_inverse_of_watched() {
        let store = MemoryWatchListStore::new();
        store.add(&id("alice"), &id("carol")).unwrap();
        store.add(&id("bob"), &id("carol")).unwrap();

        let watchers = store.get_watchers(&id("carol")).unwrap();
        assert_eq!(watchers, [id("alice"), id("bob")].into_iter().collect());

        for owner in &watchers {
            assert!(store.is_watcher(owner, &id("carol")).unwrap());
            assert!(store.get_watched(owner).unwrap().contains(&id("carol")));
        }
    }

    #[test]
    fn test_clear_removes_inverse_entries() {
        let store = MemoryWatchListStore::new();
        store
            .add_range(&id("alice"), &[id("bob"), id("carol")])
            .unwrap();
        store.clear(&id("alice")).unwrap();

        assert!(store.get_watched(&id("alice")).unwrap().is_empty());
        assert!(store.get_watchers(&id("bob")).unwrap().is_empty());
        assert!(!store.is_watcher(&id("alice"), &id("carol")).unwrap());
    }

    #[test]
    fn test_unknown_identities_yield_empty_sets() {
        let store = MemoryWatchListStore::new();
        assert!(store.get_watched(&id("nobody")).unwrap().is_empty());
        assert!(store.get_watchers(&id("nobody")).unwrap().is_empty());
    }
}
