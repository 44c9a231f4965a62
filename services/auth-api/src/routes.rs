//! HTTP surface: router, handlers, and the response envelope
//!
//! Every endpoint responds with `{success, message}` plus an optional
//! `data` object. Handlers run validation first, then the rate limiter,
//! then the actual work, so a flood of garbage requests still burns the
//! sender's budget but never touches the stores.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::{HeaderMap, StatusCode, header, request::Parts};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use phonegate_otp::{ChallengeStore, PendingRegistration, Purpose, VerifyOutcome};
use phonegate_tokens::TokenIssuer;
use phonegate_users::{NewUser, Role, User, UserStore};

use crate::error::ApiError;
use crate::throttle::{EndpointClass, RateLimiter};
use crate::validate::{
    self, ForgotRequest, LoginRequest, RegisterRequest, ResetRequest, VerifyOtpRequest,
};

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub otp: Arc<ChallengeStore>,
    pub tokens: Arc<TokenIssuer>,
    pub limiter: Arc<RateLimiter>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/auth/register", post(register))
        .route("/api/auth/register-otp", post(register_otp))
        .route("/api/auth/verify-register-otp", post(verify_register_otp))
        .route("/api/auth/login", post(login))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/verify-forgot-otp", post(verify_forgot_otp))
        .route("/api/auth/reset-password", post(reset_password))
        .route("/api/profile", get(profile))
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", delete(delete_user))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Client address for rate limiting: first `x-forwarded-for` entry, then
/// the socket peer address, then a shared "unknown" bucket.
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get("x-forwarded-for")
            && let Ok(value) = value.to_str()
            && let Some(first) = value.split(',').next()
        {
            let first = first.trim();
            if !first.is_empty() {
                return Ok(ClientAddr(first.to_string()));
            }
        }
        if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            return Ok(ClientAddr(addr.ip().to_string()));
        }
        Ok(ClientAddr("unknown".into()))
    }
}

fn ok_with(message: &str, data: serde_json::Value) -> Response {
    Json(json!({
        "success": true,
        "message": message,
        "data": data,
    }))
    .into_response()
}

fn ok_message(message: &str) -> Response {
    Json(json!({
        "success": true,
        "message": message,
    }))
    .into_response()
}

/// Record the flow outcome metric and turn the result into a response.
fn finish(flow: &'static str, result: Result<Response, ApiError>) -> Response {
    match result {
        Ok(response) => {
            crate::metrics::record_flow(flow, "ok");
            response
        }
        Err(err) => {
            warn!(flow, outcome = err.outcome_label(), error = %err, "request failed");
            crate::metrics::record_flow(flow, err.outcome_label());
            err.into_response()
        }
    }
}

async fn throttle(state: &AppState, addr: &str, class: EndpointClass) -> Result<(), ApiError> {
    if state.limiter.check(addr, class).await {
        Ok(())
    } else {
        crate::metrics::record_rate_limited(class.label());
        Err(ApiError::RateLimited)
    }
}

fn store_failure(e: phonegate_users::Error) -> ApiError {
    match e {
        phonegate_users::Error::DuplicatePhone(_) => ApiError::DuplicatePhone,
        phonegate_users::Error::NotFound(_) => ApiError::UserNotFound,
        phonegate_users::Error::Io(msg) | phonegate_users::Error::Parse(msg) => {
            error!(error = %msg, "user store failure");
            ApiError::Internal
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::MissingToken)?;
    let value = value.to_str().map_err(|_| ApiError::InvalidToken)?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingToken)
}

/// Resolve the caller from the Authorization header.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers)?;
    let claims = state.tokens.verify_session(token)?;
    state
        .users
        .get_by_id(claims.sub)
        .await
        .ok_or(ApiError::UserNotFound)
}

fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.role == Role::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn session_response(message: &str, user: &User, token: &str) -> Response {
    ok_with(
        message,
        json!({
            "user": user.public_view(),
            "sessionId": format!("session_{}", Uuid::new_v4().as_simple()),
            "token": token,
        }),
    )
}

async fn register(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let result = async {
        let valid = validate::registration(&req).map_err(ApiError::Validation)?;
        throttle(&state, &addr, EndpointClass::Register).await?;
        if state.users.get_by_phone(&valid.phone).await.is_some() {
            return Err(ApiError::DuplicatePhone);
        }
        let user = state
            .users
            .insert(NewUser {
                phone: valid.phone,
                password: valid.password,
                name: valid.name,
                email: valid.email,
                role: Role::User,
            })
            .await
            .map_err(store_failure)?;
        let token = state.tokens.issue_session(&user)?;
        info!(phone = %user.phone, id = user.id, "user registered");
        Ok(session_response("registration successful", &user, &token))
    }
    .await;
    finish("register", result)
}

async fn register_otp(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let result = async {
        let valid = validate::registration(&req).map_err(ApiError::Validation)?;
        throttle(&state, &addr, EndpointClass::Register).await?;
        if state.users.get_by_phone(&valid.phone).await.is_some() {
            return Err(ApiError::DuplicatePhone);
        }
        let phone = valid.phone.clone();
        let code = state
            .otp
            .issue_registration(PendingRegistration {
                phone: valid.phone,
                password: valid.password,
                name: valid.name,
                email: valid.email,
            })
            .await;
        info!(phone = %phone, "registration OTP issued");
        // No SMS gateway in this deployment: the code is returned in the
        // response body so clients can complete the flow.
        Ok(ok_with(
            &format!("OTP sent to {phone}"),
            json!({ "otp": code }),
        ))
    }
    .await;
    finish("register_otp", result)
}

async fn verify_register_otp(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    Json(req): Json<VerifyOtpRequest>,
) -> Response {
    let result = async {
        let (phone, code) = validate::verify_otp(&req).map_err(ApiError::Validation)?;
        throttle(&state, &addr, EndpointClass::Auth).await?;
        match state.otp.verify(&phone, Purpose::Register, &code).await {
            VerifyOutcome::Ok => {}
            VerifyOutcome::Invalid => return Err(ApiError::InvalidOtp),
            VerifyOutcome::Expired => return Err(ApiError::ExpiredOtp),
        }
        let pending = state
            .otp
            .take_pending(&phone)
            .await
            .ok_or(ApiError::MissingPendingData)?;
        let user = state
            .users
            .insert(NewUser {
                phone: pending.phone,
                password: pending.password,
                name: pending.name,
                email: pending.email,
                role: Role::User,
            })
            .await
            .map_err(store_failure)?;
        let token = state.tokens.issue_session(&user)?;
        info!(phone = %user.phone, id = user.id, "user registered via OTP");
        Ok(session_response("registration successful", &user, &token))
    }
    .await;
    finish("verify_register_otp", result)
}

async fn login(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    Json(req): Json<LoginRequest>,
) -> Response {
    let result = async {
        let (phone, password) = validate::login(&req).map_err(ApiError::Validation)?;
        throttle(&state, &addr, EndpointClass::Auth).await?;
        let user = match state.users.get_by_phone(&phone).await {
            Some(user) if user.password == password => user,
            // Unknown phone and wrong password are indistinguishable
            _ => return Err(ApiError::InvalidCredentials),
        };
        let token = state.tokens.issue_session(&user)?;
        info!(phone = %user.phone, id = user.id, "user logged in");
        Ok(session_response("login successful", &user, &token))
    }
    .await;
    finish("login", result)
}

async fn forgot_password(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    Json(req): Json<ForgotRequest>,
) -> Response {
    let result = async {
        let phone = validate::forgot(&req).map_err(ApiError::Validation)?;
        throttle(&state, &addr, EndpointClass::Auth).await?;
        if state.users.get_by_phone(&phone).await.is_none() {
            return Err(ApiError::PhoneNotFound);
        }
        let code = state.otp.issue(&phone, Purpose::Forgot).await;
        info!(phone = %phone, "password reset OTP issued");
        Ok(ok_with(
            &format!("OTP sent to {phone}"),
            json!({ "otp": code }),
        ))
    }
    .await;
    finish("forgot", result)
}

async fn verify_forgot_otp(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    Json(req): Json<VerifyOtpRequest>,
) -> Response {
    let result = async {
        let (phone, code) = validate::verify_otp(&req).map_err(ApiError::Validation)?;
        throttle(&state, &addr, EndpointClass::Auth).await?;
        match state.otp.verify(&phone, Purpose::Forgot, &code).await {
            VerifyOutcome::Ok => {}
            VerifyOutcome::Invalid => return Err(ApiError::InvalidOtp),
            VerifyOutcome::Expired => return Err(ApiError::ExpiredOtp),
        }
        let token = state.tokens.issue_reset(&phone)?;
        info!(phone = %phone, "reset token issued");
        Ok(ok_with("OTP verified", json!({ "resetToken": token })))
    }
    .await;
    finish("verify_forgot_otp", result)
}

async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Response {
    // Not rate limited: the reset token itself is the gate here, and the
    // OTP steps that mint it already ran under the auth budget.
    let result = async {
        let (phone, new_password, token) = validate::reset(&req).map_err(ApiError::Validation)?;
        let claims = state.tokens.verify_reset(&token)?;
        if claims.phone != phone {
            return Err(ApiError::InvalidToken);
        }
        state
            .users
            .update_password(&phone, new_password)
            .await
            .map_err(|e| match e {
                phonegate_users::Error::NotFound(_) => ApiError::PhoneNotFound,
                other => store_failure(other),
            })?;
        info!(phone = %phone, "password reset");
        Ok(ok_message("password reset successful"))
    }
    .await;
    finish("reset", result)
}

async fn profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = async {
        let user = authenticate(&state, &headers).await?;
        Ok(ok_with(
            "profile retrieved",
            json!({ "user": user.public_view() }),
        ))
    }
    .await;
    finish("profile", result)
}

async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = async {
        let caller = authenticate(&state, &headers).await?;
        require_admin(&caller)?;
        let users = state.users.list().await;
        let views: Vec<serde_json::Value> = users.iter().map(User::public_view).collect();
        Ok(ok_with(
            "users retrieved",
            json!({ "users": views, "total": views.len() }),
        ))
    }
    .await;
    finish("list_users", result)
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    let result = async {
        let caller = authenticate(&state, &headers).await?;
        require_admin(&caller)?;
        let removed = state.users.delete(id).await.map_err(store_failure)?;
        info!(id, phone = %removed.phone, "user deleted");
        Ok(ok_with(
            "user deleted",
            json!({ "user": removed.public_view() }),
        ))
    }
    .await;
    finish("delete_user", result)
}

/// Health endpoint: status, uptime, store sizes.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "users_total": state.users.len().await,
        "active_challenges": state.otp.active_challenges().await,
    });
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
