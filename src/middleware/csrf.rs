use axum::{
    body::Body,
    extract::Request,
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;
use crate::session::Session;

const CSRF_HEADER: &str = "x-csrf-token";
const CSRF_FORM_FIELD: &str = "_csrf";
const MAX_FORM_BYTES: usize = 1 << 20;

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Constant-time byte comparison, so token checks don't leak prefix length
/// through timing.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn is_form(req_headers: &axum::http::HeaderMap) -> bool {
    req_headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Tokens are base64url so no percent-decoding is needed.
fn token_from_form(body: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?;
    text.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == CSRF_FORM_FIELD).then(|| value.to_string())
    })
}

/// Rejects mutating requests whose CSRF token does not match the one bound
/// to the session. Non-mutating methods pass through untouched.
pub async fn guard(req: Request, next: Next) -> Response {
    if !is_mutating(req.method()) {
        return next.run(req).await;
    }

    let Some(session) = req.extensions().get::<Session>().cloned() else {
        return ApiError::Csrf.into_response();
    };

    let (parts, body) = req.into_parts();
    let mut sent = parts
        .headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Fall back to the `_csrf` form field; the body is re-attached afterwards.
    let body = if sent.is_none() && is_form(&parts.headers) {
        match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => {
                sent = token_from_form(&bytes);
                Body::from(bytes)
            }
            Err(_) => return ApiError::Csrf.into_response(),
        }
    } else {
        body
    };

    let ok = sent
        .as_deref()
        .map(|t| constant_time_eq(t.as_bytes(), session.csrf_token.as_bytes()))
        .unwrap_or(false);

    if !ok {
        warn!(path = %parts.uri.path(), "csrf token missing or mismatched");
        return ApiError::Csrf.into_response();
    }

    next.run(Request::from_parts(parts, body)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn form_field_extraction() {
        assert_eq!(
            token_from_form(b"name=x&_csrf=tok123&age=3").as_deref(),
            Some("tok123")
        );
        assert_eq!(token_from_form(b"name=x&age=3"), None);
        assert_eq!(token_from_form(b""), None);
    }

    #[test]
    fn mutating_method_detection() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
    }
}
