//! API error type and its HTTP mapping
//!
//! Every failure a handler can hit maps to one variant, and every variant
//! maps to one status code and one client-facing message. Authentication
//! failures share the same generic message so a caller cannot probe which
//! part of a credential was wrong.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request failed input validation; carries the first violation.
    #[error("{0}")]
    Validation(String),

    #[error("too many requests, try again later")]
    RateLimited,

    #[error("phone number is not registered")]
    PhoneNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("phone number is already registered")]
    DuplicatePhone,

    #[error("incorrect OTP")]
    InvalidOtp,

    #[error("OTP has expired")]
    ExpiredOtp,

    #[error("registration data missing, request a new code")]
    MissingPendingData,

    /// Wrong phone or wrong password, deliberately indistinguishable.
    #[error("invalid phone or password")]
    InvalidCredentials,

    #[error("no token provided")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    ExpiredToken,

    #[error("token not valid for this action")]
    WrongPurpose,

    #[error("permission denied for this action")]
    Forbidden,

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PhoneNotFound | ApiError::UserNotFound => StatusCode::NOT_FOUND,
            ApiError::DuplicatePhone => StatusCode::CONFLICT,
            ApiError::InvalidOtp | ApiError::ExpiredOtp | ApiError::MissingPendingData => {
                StatusCode::BAD_REQUEST
            }
            ApiError::InvalidCredentials
            | ApiError::MissingToken
            | ApiError::InvalidToken
            | ApiError::ExpiredToken
            | ApiError::WrongPurpose => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Low-cardinality label for the request outcome metric.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::RateLimited => "rate_limited",
            ApiError::PhoneNotFound | ApiError::UserNotFound => "not_found",
            ApiError::DuplicatePhone => "duplicate",
            ApiError::InvalidOtp | ApiError::ExpiredOtp | ApiError::MissingPendingData => "otp",
            ApiError::InvalidCredentials
            | ApiError::MissingToken
            | ApiError::InvalidToken
            | ApiError::ExpiredToken
            | ApiError::WrongPurpose => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::Internal => "internal",
        }
    }
}

impl From<phonegate_tokens::Error> for ApiError {
    fn from(e: phonegate_tokens::Error) -> Self {
        match e {
            phonegate_tokens::Error::Expired => ApiError::ExpiredToken,
            phonegate_tokens::Error::WrongPurpose => ApiError::WrongPurpose,
            phonegate_tokens::Error::Invalid(_) => ApiError::InvalidToken,
            phonegate_tokens::Error::Issue(_) => ApiError::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_share_one_message() {
        // Neither variant may reveal which part of the credential failed
        assert_eq!(
            ApiError::InvalidCredentials.to_string(),
            "invalid phone or password"
        );
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::DuplicatePhone.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::PhoneNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::InvalidOtp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::ExpiredToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Internal.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn token_error_mapping() {
        assert!(matches!(
            ApiError::from(phonegate_tokens::Error::Expired),
            ApiError::ExpiredToken
        ));
        assert!(matches!(
            ApiError::from(phonegate_tokens::Error::WrongPurpose),
            ApiError::WrongPurpose
        ));
        assert!(matches!(
            ApiError::from(phonegate_tokens::Error::Invalid("bad".into())),
            ApiError::InvalidToken
        ));
        assert!(matches!(
            ApiError::from(phonegate_tokens::Error::Issue("oops".into())),
            ApiError::Internal
        ));
    }
}
