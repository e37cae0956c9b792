//! Request guards: per-client rate limiting and the admin token check.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::warn;

use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;

/// Clients tracked before idle buckets are dropped.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Token buckets keyed by client address.
pub struct ClientLimiter {
    buckets: DefaultKeyedRateLimiter<IpAddr>,
}

impl ClientLimiter {
    /// A zero rate is raised to one request per second.
    pub fn new(requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            buckets: RateLimiter::keyed(Quota::per_second(rate)),
        }
    }

    /// Take one request from `client`'s bucket.
    pub fn allow(&self, client: IpAddr) -> bool {
        if self.buckets.len() >= MAX_TRACKED_CLIENTS {
            self.buckets.retain_recent();
        }
        self.buckets.check_key(&client).is_ok()
    }

    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<ClientLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    match client_ip(&request) {
        Some(client) if !limiter.allow(client) => {
            warn!(client = %client, "Rate limit exceeded");
            metrics::record_rate_limit_hit(request.uri().path());
            ApiError::RateLimited {
                message: "too many requests".to_string(),
                retry_after: Duration::from_secs(1),
            }
            .into_response()
        }
        _ => next.run(request).await,
    }
}

/// Admin routes need `Authorization: Bearer <ADMIN_TOKEN>` and stay closed
/// while no token is configured.
pub async fn require_admin_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return ApiError::forbidden("admin routes are disabled").into_response();
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) if tokens_match(token.trim(), expected) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Invalid admin token");
            ApiError::unauthorized("invalid admin token").into_response()
        }
        None => ApiError::unauthorized("missing admin token").into_response(),
    }
}

/// Time taken does not depend on where the tokens first differ.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (presented, expected) = (presented.as_bytes(), expected.as_bytes());
    presented.len() == expected.len()
        && presented
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}

/// First forwarded address, then X-Real-IP, then the peer address.
fn client_ip(request: &Request) -> Option<IpAddr> {
    let from_header = |name: &str| -> Option<IpAddr> {
        let value = request.headers().get(name)?.to_str().ok()?;
        value.split(',').next()?.trim().parse().ok()
    };

    from_header("x-forwarded-for")
        .or_else(|| from_header("x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| peer.ip())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_limits_each_client_separately() {
        let limiter = ClientLimiter::new(1);
        let first: IpAddr = "10.0.0.1".parse().unwrap();
        let second: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.allow(first));
        assert!(!limiter.allow(first));
        assert!(limiter.allow(second));
        assert_eq!(limiter.tracked(), 2);
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .header("X-Real-IP", "10.0.0.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), Some("203.0.113.7".parse().unwrap()));

        let real_ip = Request::builder()
            .header("X-Real-IP", "10.0.0.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&real_ip), Some("10.0.0.9".parse().unwrap()));

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&bare), None);
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret-token", "s3cret-token"));
        assert!(!tokens_match("s3cret-tokem", "s3cret-token"));
        assert!(!tokens_match("s3cret", "s3cret-token"));
        assert!(!tokens_match("", "s3cret-token"));
    }
}
