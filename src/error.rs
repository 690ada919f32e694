use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

/// Failures produced by the authenticator, independent of HTTP.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Covers both unknown email and wrong password so callers cannot
    /// enumerate accounts.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailAlreadyExists,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Request-scoped error surface. Every variant maps to one response shape;
/// nothing here is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailAlreadyExists,
    #[error("csrf rejected")]
    Csrf,
    #[error("invalid webhook signature")]
    Signature,
    #[error("too many requests")]
    RateLimited { retry_after: Duration },
    #[error("upstream service unavailable")]
    Upstream,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::EmailAlreadyExists => ApiError::EmailAlreadyExists,
            AuthError::Validation(msg) => ApiError::Validation(msg),
            AuthError::Internal(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "ok": false, "error": msg }),
            ),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                json!({ "ok": false, "error": "invalid credentials" }),
            ),
            ApiError::EmailAlreadyExists => (
                StatusCode::CONFLICT,
                json!({ "ok": false, "error": "email already registered" }),
            ),
            // No detail in the body for CSRF and signature failures.
            ApiError::Csrf => (StatusCode::FORBIDDEN, json!({ "ok": false })),
            ApiError::Signature => {
                warn!("webhook signature mismatch");
                (StatusCode::FORBIDDEN, json!({ "ok": false }))
            }
            ApiError::RateLimited { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                let body = json!({ "ok": false, "error": "too many requests", "retry_after": secs });
                let mut res = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                if let Ok(v) = secs.to_string().parse() {
                    res.headers_mut().insert(axum::http::header::RETRY_AFTER, v);
                }
                return res;
            }
            ApiError::Upstream => (
                StatusCode::BAD_GATEWAY,
                json!({ "ok": false, "error": "service unavailable" }),
            ),
            ApiError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "ok": false, "error": "internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_is_401() {
        let res = ApiError::InvalidCredentials.into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rate_limited_carries_retry_after_header() {
        let res = ApiError::RateLimited {
            retry_after: Duration::from_secs(42),
        }
        .into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            res.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "42"
        );
    }

    #[test]
    fn csrf_body_has_no_detail() {
        let res = ApiError::Csrf.into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
