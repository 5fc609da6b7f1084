//! Custom error types for the account service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Custom error type for the account service
///
/// Every variant maps to a fixed HTTP status; database error detail never
/// reaches the client — handlers log it and convert to `InternalServerError`.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or too-short input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Current password did not match the stored hash
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing or invalid bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Resource does not exist
    #[error("Not found")]
    NotFound,

    /// Duplicate email or other uniqueness conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// OTP code did not match or has expired
    #[error("Invalid or expired code")]
    InvalidOrExpired,

    /// Rate limit tripped on an OTP request endpoint
    #[error("Too many requests")]
    TooManyRequests,

    /// Unexpected persistence or infrastructure failure
    #[error("Internal server error")]
    InternalServerError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InvalidOrExpired => {
                (StatusCode::BAD_REQUEST, "Invalid or expired code".to_string())
            }
            ApiError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, try again later".to_string(),
            ),
            ApiError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Type alias for account service results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(ApiError::Validation("too short".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::InvalidCredentials),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(ApiError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ApiError::Conflict("email already in use".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ApiError::InvalidOrExpired),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::TooManyRequests),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(ApiError::InternalServerError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
