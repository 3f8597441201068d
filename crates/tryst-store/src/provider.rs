//! The watch-list provider interface.

use std::collections::BTreeSet;

use tryst_shared::Identity;

use crate::Result;

/// Many-to-many "owner watches target" relation.
///
/// All mutations are idempotent set operations and all operations on a
/// single store instance are linearizable with respect to each other;
/// implementations guard their state with one coarse lock. No
/// cross-identity transaction is ever required.
///
/// Every method rejects empty identities with
/// [`StoreError::InvalidArgument`](crate::StoreError::InvalidArgument)
/// before touching any state.
pub trait WatchListStore: Send + Sync {
    /// Add `target` to `owner`'s watch-list.
    fn add(&self, owner: &Identity, target: &Identity) -> Result<()>;

    /// Add every target in `targets` to `owner`'s watch-list.
    fn add_range(&self, owner: &Identity, targets: &[Identity]) -> Result<()>;

    /// Remove `target` from `owner`'s watch-list.
    fn remove(&self, owner: &Identity, target: &Identity) -> Result<()>;

    /// Remove everything from `owner`'s watch-list.
    fn clear(&self, owner: &Identity) -> Result<()>;

    /// The set of identities `owner` watches. Empty for unknown owners.
    fn get_watched(&self, owner: &Identity) -> Result<BTreeSet<Identity>>;

    /// The set of identities watching `target`. Empty for unknown
    /// targets. Exact inverse of [`WatchListStore::get_watched`].
    fn get_watchers(&self, target: &Identity) -> Result<BTreeSet<Identity>>;

    /// Whether `owner` watches `target`. Authorizes connection
    /// brokering and group invitations.
    fn is_watcher(&self, owner: &Identity, target: &Identity) -> Result<bool>;
}

/// Validate identities at the store boundary.
pub(crate) fn check_identity(identity: &Identity) -> Result<()> {
    identity
        .validate()
        .map_err(|_| crate::StoreError::InvalidArgument("identity must not be empty"))
}
