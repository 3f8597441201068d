use thiserror::Error;

use tryst_shared::SocialError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Empty identity passed to a mutation or query.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// SQLite error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Migration failure.
    #[error("migration error: {0}")]
    Migration(String),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for SocialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidArgument(msg) => SocialError::InvalidArgument(msg),
            other => SocialError::Upstream(other.to_string()),
        }
    }
}
