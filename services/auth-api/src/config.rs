//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The JWT signing secret is loaded from PHONEGATE_JWT_SECRET env var or
//! jwt_secret_file, never stored in the TOML directly to avoid leaking
//! secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Persistence settings
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub users_file: PathBuf,
}

/// Token and challenge settings
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(skip)]
    pub jwt_secret: Option<Secret<String>>,
    /// Path to a file containing the secret (alternative to PHONEGATE_JWT_SECRET env var)
    #[serde(default)]
    pub jwt_secret_file: Option<PathBuf>,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_reset_ttl")]
    pub reset_ttl_secs: u64,
    #[serde(default = "default_otp_ttl")]
    pub otp_ttl_secs: u64,
}

/// Fixed-window rate limit settings, per client address
#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_auth_max")]
    pub auth_max: u32,
    #[serde(default = "default_auth_window")]
    pub auth_window_secs: u64,
    #[serde(default = "default_register_max")]
    pub register_max: u32,
    #[serde(default = "default_register_window")]
    pub register_window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            auth_max: default_auth_max(),
            auth_window_secs: default_auth_window(),
            register_max: default_register_max(),
            register_window_secs: default_register_window(),
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_reset_ttl() -> u64 {
    900
}

fn default_otp_ttl() -> u64 {
    300
}

fn default_auth_max() -> u32 {
    5
}

fn default_auth_window() -> u64 {
    900
}

fn default_register_max() -> u32 {
    3
}

fn default_register_window() -> u64 {
    3600
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// JWT secret resolution order:
    /// 1. PHONEGATE_JWT_SECRET env var
    /// 2. jwt_secret_file path from config
    ///
    /// A missing secret is a startup error: tokens signed with an ad-hoc key
    /// would silently invalidate on every restart.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.auth.session_ttl_secs == 0 {
            return Err(common::Error::Config(
                "session_ttl_secs must be greater than 0".into(),
            ));
        }
        if config.auth.reset_ttl_secs == 0 {
            return Err(common::Error::Config(
                "reset_ttl_secs must be greater than 0".into(),
            ));
        }
        if config.auth.otp_ttl_secs == 0 {
            return Err(common::Error::Config(
                "otp_ttl_secs must be greater than 0".into(),
            ));
        }
        if config.limits.auth_max == 0 || config.limits.register_max == 0 {
            return Err(common::Error::Config(
                "rate limit maximums must be greater than 0".into(),
            ));
        }
        if config.limits.auth_window_secs == 0 || config.limits.register_window_secs == 0 {
            return Err(common::Error::Config(
                "rate limit windows must be greater than 0".into(),
            ));
        }

        // Resolve JWT secret: env var takes precedence over file
        if let Ok(secret) = std::env::var("PHONEGATE_JWT_SECRET") {
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.auth.jwt_secret = Some(Secret::new(secret));
            }
        }
        if config.auth.jwt_secret.is_none() {
            if let Some(ref secret_file) = config.auth.jwt_secret_file {
                let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                    common::Error::Config(format!(
                        "failed to read jwt_secret_file {}: {e}",
                        secret_file.display()
                    ))
                })?;
                let secret = secret.trim().to_owned();
                if !secret.is_empty() {
                    config.auth.jwt_secret = Some(Secret::new(secret));
                }
            }
        }
        if config.auth.jwt_secret.is_none() {
            return Err(common::Error::Config(
                "no JWT secret: set PHONEGATE_JWT_SECRET or jwt_secret_file".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("phonegate.toml")
    }
}
