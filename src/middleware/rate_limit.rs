//! Per-IP sliding-window limiter for the unauthenticated auth endpoints.
use crate::error::AppError;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    requests: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(name: &'static str, max_requests: usize, window: Duration) -> Self {
        Self {
            name,
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Login: 4 attempts per 15 minutes.
    pub fn login() -> Self {
        Self::new("login", 4, Duration::from_secs(15 * 60))
    }

    /// Registration: 3 accounts per hour.
    pub fn register() -> Self {
        Self::new("register", 3, Duration::from_secs(60 * 60))
    }

    /// Records the attempt and reports whether `identifier` is still under the limit.
    pub async fn check(&self, identifier: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        let history = requests.entry(identifier.to_string()).or_default();
        history.retain(|&at| now.duration_since(at) < self.window);

        if history.len() < self.max_requests {
            history.push(now);
            true
        } else {
            false
        }
    }

    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        requests.retain(|_, history| {
            history.retain(|&at| now.duration_since(at) < self.window);
            !history.is_empty()
        });

        tracing::debug!(
            "Rate limiter {} cleanup: {} active identifiers",
            self.name,
            requests.len()
        );
    }
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip().to_string();

    if !limiter.check(&ip).await {
        tracing::warn!("Rate limit {} exceeded for IP: {}", limiter.name, ip);
        return AppError::TooManyRequests.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_limit_per_identifier() {
        let limiter = RateLimiter::login();

        for _ in 0..4 {
            assert!(limiter.check("10.0.0.1").await);
        }
        assert!(!limiter.check("10.0.0.1").await);
        assert!(limiter.check("10.0.0.2").await);
    }

    #[tokio::test]
    async fn cleanup_drops_stale_identifiers() {
        let limiter = RateLimiter::new("test", 5, Duration::from_millis(50));

        limiter.check("ip1").await;
        limiter.check("ip2").await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        limiter.cleanup().await;

        assert!(limiter.requests.read().await.is_empty());
    }
}
