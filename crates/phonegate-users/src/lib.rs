//! Durable user records for the Phonegate auth service
//!
//! The user file is the single source of truth for registered accounts.
//! Phone numbers are the external identifier and are unique at all times;
//! records are created on registration, mutated only by password reset,
//! and removed only by the admin delete operation.

pub mod error;
pub mod store;

pub use error::{Error, Result};
pub use store::{NewUser, Role, User, UserStore};
