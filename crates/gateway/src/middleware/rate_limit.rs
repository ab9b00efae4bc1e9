//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use hmrag_common::{config::RateLimitConfig, errors::AppError, Result};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Shared limiter plus the configured rate, reported in 429 bodies
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<DefaultDirectRateLimiter>,
    requests_per_second: u32,
}

fn non_zero(value: u32, name: &str) -> Result<NonZeroU32> {
    NonZeroU32::new(value).ok_or_else(|| AppError::Configuration {
        message: format!("rate_limit.{} must be greater than zero", name),
    })
}

/// Create a new global rate limiter
pub fn create_rate_limiter(config: &RateLimitConfig) -> Result<RateLimit> {
    let quota = Quota::per_second(non_zero(config.requests_per_second, "requests_per_second")?)
        .allow_burst(non_zero(config.burst, "burst")?);

    Ok(RateLimit {
        limiter: Arc::new(RateLimiter::direct(quota)),
        requests_per_second: config.requests_per_second,
    })
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limit): State<RateLimit>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    match limit.limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!("Rate limit exceeded");
            Err(AppError::RateLimited {
                limit: limit.requests_per_second,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let config = RateLimitConfig { requests_per_second: 1, burst: 2, enabled: true };
        let limit = create_rate_limiter(&config).unwrap();
        assert!(limit.limiter.check().is_ok());
        assert!(limit.limiter.check().is_ok());
        assert!(limit.limiter.check().is_err());
    }

    #[test]
    fn test_zero_rate_is_configuration_error() {
        let config = RateLimitConfig { requests_per_second: 0, burst: 1, enabled: true };
        assert!(matches!(
            create_rate_limiter(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
