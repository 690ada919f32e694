//! Sliding-window rate limiting per (client identity, endpoint).
//!
//! Best-effort and process-local by design: buckets live in this process's
//! memory, so a multi-instance deployment needs these moved to a shared
//! store before the limit means anything globally.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, PartialEq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Injected seam so tests use the in-memory window and a production
/// deployment can swap in a shared cache.
#[axum::async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, client: &str, endpoint: &str) -> RateDecision;
}

/// In-memory sliding window: per key, the instants of recent calls, pruned
/// lazily on each check.
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(String, String), Vec<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn check_at(&self, client: &str, endpoint: &str, now: Instant) -> RateDecision {
        let window = self.config.window();
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry((client.to_string(), endpoint.to_string()))
            .or_default();
        bucket.retain(|t| now.duration_since(*t) < window);

        if bucket.len() >= self.config.max_calls as usize {
            // An empty bucket still limits when max_calls is zero.
            let retry_after = bucket
                .first()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            return RateDecision::Limited { retry_after };
        }
        bucket.push(now);
        RateDecision::Allowed
    }
}

#[axum::async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check(&self, client: &str, endpoint: &str) -> RateDecision {
        self.check_at(client, endpoint, Instant::now())
    }
}

/// First `X-Forwarded-For` entry, else the peer address, else a shared
/// bucket for clients we cannot tell apart.
fn client_identity(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn guard(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let client = client_identity(&req);
    let endpoint = req.uri().path().to_string();

    match state.limiter.check(&client, &endpoint).await {
        RateDecision::Allowed => next.run(req).await,
        RateDecision::Limited { retry_after } => {
            warn!(%client, %endpoint, "rate limit exceeded");
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}
