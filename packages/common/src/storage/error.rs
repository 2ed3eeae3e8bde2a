use thiserror::Error;

/// Errors raised by a [`MediaStore`](super::MediaStore).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("media not found: {0}")]
    NotFound(String),

    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid media key: {0}")]
    InvalidKey(String),

    #[error("media exceeds size limit ({actual} > {limit} bytes)")]
    SizeLimitExceeded { actual: u64, limit: u64 },
}
