use thiserror::Error;

/// Failure taxonomy shared by the server and client crates.
///
/// Validation errors are rejected at the boundary before any state
/// mutation. Authorization and availability failures travel back to the
/// caller as response values; the only condition fatal to a session is
/// an identity mismatch or resolver failure during announce.
#[derive(Debug, Error)]
pub enum SocialError {
    /// Null/empty identity or missing required field. No side effect.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Announced identity disagrees with the authenticated identity.
    /// Fatal to the session, never retried.
    #[error("announced identity does not match authenticated identity")]
    IdentityMismatch,

    /// Target identity or group id unknown.
    #[error("not found: {0}")]
    NotFound(String),

    /// Action requires a watch relationship that does not exist.
    #[error("not authorized: {0}")]
    NotAuthorized(&'static str),

    /// Target has no live session.
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Resolver or store failed for infrastructure reasons.
    #[error("upstream failure: {0}")]
    Upstream(String),
}
