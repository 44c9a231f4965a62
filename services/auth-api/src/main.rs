//! Phonegate auth API
//!
//! Single-binary service providing phone-number authentication:
//! registration (direct and OTP-verified), login, OTP-backed password
//! reset, and role-gated user administration. State is a JSON user file
//! plus in-memory challenges and rate limit windows.

mod config;
mod error;
mod metrics;
mod routes;
mod throttle;
mod validate;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phonegate_otp::ChallengeStore;
use phonegate_tokens::TokenIssuer;
use phonegate_users::UserStore;

use crate::config::Config;
use crate::routes::{AppState, build_router};
use crate::throttle::{Policy, RateLimiter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting phonegate-auth-api");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        users_file = %config.storage.users_file.display(),
        session_ttl_secs = config.auth.session_ttl_secs,
        otp_ttl_secs = config.auth.otp_ttl_secs,
        "configuration loaded"
    );

    let users = UserStore::load(config.storage.users_file.clone())
        .await
        .context("failed to load user store")?;

    let jwt_secret = config
        .auth
        .jwt_secret
        .as_ref()
        .context("JWT secret missing after config load")?;

    let tokens = TokenIssuer::with_ttls(
        jwt_secret.expose().as_bytes(),
        Duration::from_secs(config.auth.session_ttl_secs),
        Duration::from_secs(config.auth.reset_ttl_secs),
    );

    let otp = ChallengeStore::with_ttl(Duration::from_secs(config.auth.otp_ttl_secs));

    let limiter = RateLimiter::new(
        Policy {
            max: config.limits.auth_max,
            window: Duration::from_secs(config.limits.auth_window_secs),
        },
        Policy {
            max: config.limits.register_max,
            window: Duration::from_secs(config.limits.register_window_secs),
        },
    );

    let state = AppState {
        users: Arc::new(users),
        otp: Arc::new(otp),
        tokens: Arc::new(tokens),
        limiter: Arc::new(limiter),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "accepting requests");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
