use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The handle does not resolve to a live entry.
    #[error("Handle '{0}' not found")]
    NotFound(String),

    #[error("Invalid handle: '{0}'")]
    InvalidHandle(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Medium failure while creating a handle. The handle never existed.
    #[error("Creation failed: {0}")]
    CreationFailed(String),

    /// Medium failure on an existing handle. Not retried.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("Index schema version {found} is newer than supported version {supported}")]
    SchemaVersion { found: i64, supported: i64 },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

pub type Result<T> = std::result::Result<T, StoreError>;
