//! JWT bearer authentication.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::rest::ApiState;

/// Claims carried by an API token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (client id).
    pub sub: String,
    /// Expiration time, Unix seconds.
    pub exp: usize,
}

/// Validates HS256 bearer tokens against the configured secret.
#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Creates a validator from the shared secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Validates a token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] for any rejected token.
    pub fn validate(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| ApiError::Unauthorized(e.to_string()))
    }
}

/// Extracts the token from a `Bearer <token>` header value.
#[must_use]
pub fn extract_bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ")
}

/// Authentication middleware for the protected routes.
pub async fn auth_middleware(
    State(state): State<Arc<ApiState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let Some(header) = header else {
        return ApiError::Unauthorized("missing Authorization header".to_string()).into_response();
    };
    let Some(token) = extract_bearer_token(header) else {
        return ApiError::Unauthorized("expected a bearer token".to_string()).into_response();
    };

    match state.auth.validate(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
