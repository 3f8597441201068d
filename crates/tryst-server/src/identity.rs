//! Identity resolution.
//!
//! A transport session is anonymous until the resolver confirms which
//! identity it belongs to. Real deployments back this with whatever
//! authenticated the connection; the implementations here cover tests
//! and development servers.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use tryst_shared::{Identity, SocialError};

use crate::session::SessionId;

/// Proves that a transport session belongs to a claimed identity.
///
/// Resolution may be asynchronous and may fail; a failure during
/// announce is fatal to the session and never retried.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve the authenticated identity for `session`.
    ///
    /// `claimed` is the identity the current announce asserts. A
    /// resolver backed by a real authentication handshake ignores it
    /// and answers from its own records.
    async fn resolve(&self, session: SessionId, claimed: &Identity)
        -> Result<Identity, SocialError>;

    /// Forget any state held for `session`. Called on disconnect.
    fn release(&self, session: SessionId) {
        let _ = session;
    }
}

/// Resolver with a fixed session→identity table, for tests.
#[derive(Default)]
pub struct StaticResolver {
    table: Mutex<HashMap<SessionId, Identity>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: SessionId, identity: Identity) {
        self.table
            .lock()
            .expect("resolver lock poisoned")
            .insert(session, identity);
    }
}

#[async_trait]
impl IdentityResolver for StaticResolver {
    async fn resolve(
        &self,
        session: SessionId,
        _claimed: &Identity,
    ) -> Result<Identity, SocialError> {
        self.table
            .lock()
            .expect("resolver lock poisoned")
            .get(&session)
            .cloned()
            .ok_or_else(|| SocialError::Upstream("no identity on record for session".into()))
    }

    fn release(&self, session: SessionId) {
        self.table
            .lock()
            .expect("resolver lock poisoned")
            .remove(&session);
    }
}

/// Trust-on-first-use resolver for development servers.
///
/// The first identity a session claims is pinned; a later announce
/// under a different identity on the same session fails. This provides
/// no real authentication and exists so the binary is usable without
/// an external provider.
#[derive(Default)]
pub struct PinningResolver {
    pinned: Mutex<HashMap<SessionId, Identity>>,
}

impl PinningResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityResolver for PinningResolver {
    async fn resolve(
        &self,
        session: SessionId,
        claimed: &Identity,
    ) -> Result<Identity, SocialError> {
        claimed.validate()?;

        let mut pinned = self.pinned.lock().expect("resolver lock poisoned");
        Ok(pinned.entry(session).or_insert_with(|| claimed.clone()).clone())
    }

    fn release(&self, session: SessionId) {
        self.pinned
            .lock()
            .expect("resolver lock poisoned")
            .remove(&session);
    }
}
