//! Error types for token operations

/// Errors from token issuance and verification.
///
/// `Expired` and `WrongPurpose` are distinct from `Invalid` so the caller
/// can tell a client whether to re-authenticate, re-request a reset, or
/// treat the token as garbage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token purpose mismatch")]
    WrongPurpose,

    #[error("token creation failed: {0}")]
    Issue(String),
}

/// Result alias for token operations.
pub type Result<T> = std::result::Result<T, Error>;
