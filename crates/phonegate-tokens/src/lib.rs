//! Token issuance and verification for the Phonegate auth service
//!
//! Two token kinds with disjoint claim shapes:
//! - session tokens prove an authenticated identity (id, phone, role), 1 hour
//! - reset tokens prove OTP-verified possession of a phone number for the
//!   password-reset flow, tagged with a fixed purpose, 15 minutes
//!
//! The shapes are disjoint on purpose: a reset token presented where a
//! session token is expected fails claim decoding (and vice versa), so the
//! kinds can never be interchanged. The signing key is process-wide
//! configuration; rotating it invalidates all outstanding tokens.

pub mod error;
pub mod issuer;

pub use error::{Error, Result};
pub use issuer::{
    RESET_PURPOSE, RESET_TTL, ResetClaims, SESSION_TTL, SessionClaims, TokenIssuer,
};
