//! Per-client request throttling for the chat endpoints.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tokio::task::JoinHandle;

use crate::core::errors::ApiError;

pub type IpRateLimiter = DefaultKeyedRateLimiter<IpAddr>;

pub fn build_limiter(per_minute: u32, burst: u32) -> Arc<IpRateLimiter> {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(
        Quota::per_minute(per_minute).allow_burst(burst),
    ))
}

/// Drops clients whose bucket has fully refilled, returning how many remain.
pub fn prune(limiter: &IpRateLimiter) -> usize {
    limiter.retain_recent();
    limiter.shrink_to_fit();
    limiter.len()
}

/// Prunes idle client entries every `period` for the life of the process.
pub fn spawn_pruner(limiter: Arc<IpRateLimiter>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let remaining = prune(&limiter);
            tracing::debug!(clients = remaining, "Rate limiter pruned");
        }
    })
}

pub async fn limit_by_ip(
    State(limiter): State<Arc<IpRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    // Without connect info (e.g. a plain `serve` in tests) all callers share one bucket.
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if limiter.check_key(&ip).is_err() {
        tracing::warn!(client = %ip, "Rate limit exceeded");
        return ApiError::TooManyRequests.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_enforced_per_ip() {
        let limiter = build_limiter(1, 2);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_err());
        assert!(limiter.check_key(&b).is_ok());
    }

    #[test]
    fn prune_keeps_clients_with_spent_tokens() {
        let limiter = build_limiter(1, 2);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        limiter.check_key(&a).unwrap();

        assert_eq!(prune(&limiter), 1);
        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_err());
    }

    #[test]
    fn prune_forgets_refilled_clients() {
        let quota = Quota::with_period(Duration::from_millis(1)).unwrap();
        let limiter: IpRateLimiter = RateLimiter::keyed(quota);
        for last in 1..=50u8 {
            let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, last));
            limiter.check_key(&ip).unwrap();
        }
        assert_eq!(limiter.len(), 50);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(prune(&limiter), 0);
    }

    #[tokio::test]
    async fn pruner_runs_on_its_period() {
        let quota = Quota::with_period(Duration::from_millis(1)).unwrap();
        let limiter: Arc<IpRateLimiter> = Arc::new(RateLimiter::keyed(quota));
        limiter.check_key(&IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();

        let handle = spawn_pruner(limiter.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(limiter.is_empty());
        handle.abort();
    }
}
