/// Rate Limiting System
use crate::error::{CoreError, CoreResult};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second for credential endpoints (scan, login, quick login)
    pub credential_rps: u32,
    /// Requests per second for everything else
    pub general_rps: u32,
    /// Burst size
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            credential_rps: 5,
            general_rps: 100,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    pub fn from_server_config(config: &crate::config::RateLimitConfig) -> Self {
        Self {
            credential_rps: config.credential_rps,
            general_rps: config.general_rps,
            burst_size: 20,
        }
    }
}

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    credential: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    general: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let credential_quota = Quota::per_second(
            NonZeroU32::new(config.credential_rps).unwrap_or(NonZeroU32::new(5).unwrap()),
        )
        .allow_burst(NonZeroU32::new(config.burst_size / 2).unwrap_or(NonZeroU32::new(10).unwrap()));

        let general_quota = Quota::per_second(
            NonZeroU32::new(config.general_rps).unwrap_or(NonZeroU32::new(100).unwrap()),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::new(20).unwrap()));

        Self {
            credential: Arc::new(GovernorLimiter::direct(credential_quota)),
            general: Arc::new(GovernorLimiter::direct(general_quota)),
        }
    }

    /// Check rate limit for credential-bearing requests
    pub fn check_credential(&self) -> CoreResult<()> {
        match self.credential.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(CoreError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }

    /// Check rate limit for all other requests
    pub fn check_general(&self) -> CoreResult<()> {
        match self.general.check() {
            Ok(_) => Ok(()),
            Err(_) => Err(CoreError::RateLimitExceeded {
                retry_after: std::time::Duration::from_secs(1),
            }),
        }
    }
}

/// Endpoints that accept or mint credentials get the stricter tier.
fn is_credential_path(path: &str) -> bool {
    path.starts_with("/api/registration/") || path.starts_with("/api/auth/login")
        || path.starts_with("/api/auth/quick-login")
        || path.starts_with("/api/auth/refresh")
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !ctx.config.rate_limit.enabled {
        return Ok(next.run(request).await);
    }

    let result = if is_credential_path(request.uri().path()) {
        ctx.rate_limiter.check_credential()
    } else {
        ctx.rate_limiter.check_general()
    };

    match result {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => Err(StatusCode::TOO_MANY_REQUESTS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_allows_initial_requests() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        assert!(limiter.check_credential().is_ok());
        assert!(limiter.check_general().is_ok());
    }

    #[test]
    fn credential_burst_is_capped() {
        let limiter = RateLimiter::new(RateLimitConfig {
            credential_rps: 2,
            general_rps: 100,
            burst_size: 4,
        });

        for _ in 0..2 {
            assert!(limiter.check_credential().is_ok());
        }
        assert!(limiter.check_credential().is_err());
    }

    #[test]
    fn credential_paths_are_classified() {
        assert!(is_credential_path("/api/registration/scan"));
        assert!(is_credential_path("/api/auth/login"));
        assert!(is_credential_path("/api/auth/quick-login"));
        assert!(!is_credential_path("/api/auth/saved-accounts"));
        assert!(!is_credential_path("/health"));
    }
}
