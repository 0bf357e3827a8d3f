use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use async_trait::async_trait;
use std::net::SocketAddr;
use voyage_store::RedisClient;

use crate::state::AppState;

const WINDOW_SECONDS: i64 = 60;

/// Counts requests per key within a fixed window.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Whether one more request under `key` stays within `limit`.
    async fn allow(&self, key: &str, limit: i64, window_seconds: i64) -> anyhow::Result<bool>;
}

#[async_trait]
impl RateLimiter for RedisClient {
    async fn allow(&self, key: &str, limit: i64, window_seconds: i64) -> anyhow::Result<bool> {
        Ok(self.check_rate_limit(key, limit, window_seconds).await?)
    }
}

/// Per-IP fixed window over the customer routes. Provider webhooks are never
/// throttled. Fails open when the limiter is unreachable.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(limiter) = &state.rate_limiter else {
        return next.run(req).await;
    };

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("ratelimit:{}", ip);

    match limiter
        .allow(&key, state.business_rules.rate_limit_per_minute, WINDOW_SECONDS)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            tracing::warn!("Rate limit exceeded for {}", ip);
            (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
        }
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
            next.run(req).await
        }
    }
}
