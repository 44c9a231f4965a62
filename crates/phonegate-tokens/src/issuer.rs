//! Session and reset token issuance
//!
//! HS256 JWTs via `jsonwebtoken` with zero expiry leeway, so a token issued
//! at time T with a 1-hour lifetime is rejected at exactly T+1h. TTLs are
//! constructor parameters so tests can drive expiry without clock mocking.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use phonegate_users::{Role, User};

use crate::error::{Error, Result};

/// Session token lifetime.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Reset token lifetime.
pub const RESET_TTL: Duration = Duration::from_secs(15 * 60);

/// Purpose tag embedded in reset tokens.
pub const RESET_PURPOSE: &str = "reset_password";

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: u64,
    pub phone: String,
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
}

/// Claims carried by a reset token.
///
/// No identity beyond the phone: the token only proves the holder passed
/// OTP verification for that number. The caller must check `phone` against
/// the request's phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub phone: String,
    pub purpose: String,
    pub iat: u64,
    pub exp: u64,
}

/// Creates and verifies both token kinds with one process-wide key.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenIssuer {
    /// Issuer with the default lifetimes (1 h sessions, 15 min resets).
    pub fn new(secret: &[u8]) -> Self {
        Self::with_ttls(secret, SESSION_TTL, RESET_TTL)
    }

    /// Issuer with explicit lifetimes.
    pub fn with_ttls(secret: &[u8], session_ttl: Duration, reset_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            session_ttl,
            reset_ttl,
        }
    }

    /// Issue a session token for an authenticated user.
    pub fn issue_session(&self, user: &User) -> Result<String> {
        let now = now_secs();
        let claims = SessionClaims {
            sub: user.id,
            phone: user.phone.clone(),
            role: user.role,
            iat: now,
            exp: now + self.session_ttl.as_secs(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::Issue(e.to_string()))
    }

    /// Issue a reset token bound to a phone number.
    pub fn issue_reset(&self, phone: &str) -> Result<String> {
        let now = now_secs();
        let claims = ResetClaims {
            phone: phone.to_string(),
            purpose: RESET_PURPOSE.to_string(),
            iat: now,
            exp: now + self.reset_ttl.as_secs(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::Issue(e.to_string()))
    }

    /// Verify a session token: signature, expiry, and claim shape.
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.decoding_key, &validation())
            .map(|data| data.claims)
            .map_err(map_decode_error)
    }

    /// Verify a reset token: signature, expiry, claim shape, purpose tag.
    ///
    /// The phone-match check against the request is the caller's job —
    /// this only proves the token is a live, well-formed reset token.
    pub fn verify_reset(&self, token: &str) -> Result<ResetClaims> {
        let claims = decode::<ResetClaims>(token, &self.decoding_key, &validation())
            .map(|data| data.claims)
            .map_err(map_decode_error)?;
        if claims.purpose != RESET_PURPOSE {
            return Err(Error::WrongPurpose);
        }
        Ok(claims)
    }
}

/// HS256 validation with no expiry leeway.
fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> Error {
    match e.kind() {
        ErrorKind::ExpiredSignature => Error::Expired,
        _ => Error::Invalid(e.to_string()),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
