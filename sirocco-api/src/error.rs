//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sirocco_engine::PortfolioError;
use thiserror::Error;

/// API-layer error.
///
/// Domain errors from the engine map to 400; everything else is a 500-class
/// failure.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Token missing, malformed or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid request or deterministic business rejection.
    #[error("{0}")]
    BadRequest(String),

    /// Transient failure behind the API.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PortfolioError> for ApiError {
    fn from(err: PortfolioError) -> Self {
        if err.is_domain() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always "error".
    pub status: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            status: "error",
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sirocco_engine::ports::StoreError;

    #[test]
    fn test_domain_errors_map_to_400() {
        let err: ApiError = PortfolioError::NotFound("a".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: ApiError = PortfolioError::AlreadyExists("a".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_transient_errors_map_to_500() {
        let err: ApiError = PortfolioError::Store(StoreError::new("down")).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
