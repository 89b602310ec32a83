use std::num::NonZeroU32;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;

use crate::AppState;

/// Global (not per-client) request rate limiter.
pub struct AppRateLimiter {
    limiter: DefaultDirectRateLimiter,
    requests_per_second: f32,
    burst_size: u32,
}

impl std::fmt::Debug for AppRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRateLimiter")
            .field("requests_per_second", &self.requests_per_second)
            .field("burst_size", &self.burst_size)
            .finish()
    }
}

impl AppRateLimiter {
    /// Build a limiter replenishing `requests_per_second` cells with a bucket
    /// of `burst_size`. Non-positive rates fall back to one per second and a
    /// zero burst to one.
    #[must_use]
    pub fn new(requests_per_second: f32, burst_size: u32) -> Self {
        let period = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / f64::from(requests_per_second))
        } else {
            Duration::from_secs(1)
        };
        let burst = NonZeroU32::new(burst_size).unwrap_or(nonzero!(1u32));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
            .allow_burst(burst);

        Self {
            limiter: RateLimiter::direct(quota),
            requests_per_second,
            burst_size: burst.get(),
        }
    }

    /// Take one cell. Returns `false` when the bucket is empty.
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Middleware to enforce rate limits
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.config.resilience.rate_limit_enabled && !state.rate_limiter.check() {
        tracing::warn!(
            name: "http.rate_limited",
            path = %req.uri().path(),
            "Rate limit exceeded"
        );
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_refill() {
        let limiter = AppRateLimiter::new(20.0, 3);

        assert!(limiter.check());
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());

        // One cell every 50ms.
        std::thread::sleep(Duration::from_millis(120));
        assert!(limiter.check());
    }

    #[test]
    fn test_degenerate_settings() {
        let limiter = AppRateLimiter::new(0.0, 0);
        assert_eq!(limiter.burst_size, 1);
        assert!(limiter.check());
        assert!(!limiter.check());
    }
}
