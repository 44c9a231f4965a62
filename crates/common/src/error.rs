//! Shared error type for configuration loading

use thiserror::Error;

/// Errors raised while loading and validating service configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using the shared Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_message() {
        let err = Error::Config("session_ttl_secs must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: session_ttl_secs must be greater than 0"
        );
    }

    #[test]
    fn io_error_converts_via_from() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into();
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
    }

    #[test]
    fn toml_error_converts_via_from() {
        let parse_err = toml::from_str::<toml::Value>("not }{ valid").unwrap_err();
        let err: Error = parse_err.into();
        assert!(err.to_string().starts_with("TOML parse error:"), "got: {err}");
    }
}
