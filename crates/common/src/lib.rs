//! Common types for the Phonegate workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
