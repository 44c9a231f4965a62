//! Error types for user store operations

/// Errors from user store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("phone already registered: {0}")]
    DuplicatePhone(String),

    #[error("user not found: {0}")]
    NotFound(String),

    #[error("user store I/O error: {0}")]
    Io(String),

    #[error("user store parse error: {0}")]
    Parse(String),
}

/// Result alias for user store operations.
pub type Result<T> = std::result::Result<T, Error>;
