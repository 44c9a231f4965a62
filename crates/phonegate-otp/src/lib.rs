//! One-time-password challenges and pending registrations
//!
//! A challenge is a 6-digit code bound to a phone number and a purpose,
//! live for a fixed window. At most one challenge per phone exists at a
//! time; reissuing replaces the old one. Registration challenges carry a
//! pending registration alongside them, which lives exactly as long as a
//! live registration challenge exists for that phone.

pub mod store;

pub use store::{
    ChallengeStore, OTP_TTL, PendingRegistration, Purpose, VerifyOutcome,
};
