/// Request rate limiting
use crate::{
    config::RateLimitConfig,
    error::{MarketError, MarketResult},
};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Read and write traffic are metered separately so a burst of offers
/// cannot starve browsing.
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    read: Arc<DirectLimiter>,
    write: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            read: Arc::new(GovernorLimiter::direct(quota(config.read_rps, 100))),
            write: Arc::new(GovernorLimiter::direct(quota(config.write_rps, 20))),
        }
    }

    /// Check rate limit for GET/HEAD traffic
    pub fn check_read(&self) -> MarketResult<()> {
        self.check(&self.read)
    }

    /// Check rate limit for mutating traffic
    pub fn check_write(&self) -> MarketResult<()> {
        self.check(&self.write)
    }

    fn check(&self, limiter: &DirectLimiter) -> MarketResult<()> {
        if !self.enabled {
            return Ok(());
        }
        limiter.check().map_err(|_| MarketError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }
}

fn quota(rps: u32, fallback: u32) -> Quota {
    let per_second = NonZeroU32::new(rps)
        .or_else(|| NonZeroU32::new(fallback))
        .unwrap_or(NonZeroU32::MIN);
    Quota::per_second(per_second)
}

fn is_read(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let result = if is_read(request.method()) {
        ctx.rate_limiter.check_read()
    } else {
        ctx.rate_limiter.check_write()
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!(method = %request.method(), path = %request.uri().path(), "rate limited");
            e.into_response()
        }
    }
}
