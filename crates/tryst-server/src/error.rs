use thiserror::Error;

use tryst_shared::SocialError;

/// Errors surfaced by the server runtime.
///
/// Protocol-level negatives (not found, not authorized, peer offline)
/// never appear here; they travel back to clients as typed response
/// values. This enum covers the infrastructure failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("social error: {0}")]
    Social(#[from] SocialError),

    #[error("store error: {0}")]
    Store(#[from] tryst_store::StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
