//! ABOUTME: Fixed-window rate limiting keyed by client IP
//! ABOUTME: Guards the login and setup endpoints against credential stuffing

use crate::models::ProblemDetails;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpResponse,
};
use dashmap::DashMap;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

/// Outcome of a single rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// In-memory limiter shared by every worker
#[derive(Debug, Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, RateLimitEntry>>,
    max_requests: u32,
    window_duration: Duration,
    trusted_proxies: Arc<Vec<String>>,
    checks: Arc<AtomicU64>,
}

/// Expired windows are swept once per this many checks
const SWEEP_EVERY: u64 = 256;

impl RateLimiter {
    pub fn new(max_requests: u32, window_duration: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_requests,
            window_duration,
            trusted_proxies: Arc::new(vec!["127.0.0.1".to_string(), "::1".to_string()]),
            checks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(config: &sd_config::RateLimitConfig) -> Self {
        Self::new(
            config.requests_per_minute,
            Duration::from_secs(config.window_seconds.max(1)),
        )
        .with_trusted_proxies(config.trusted_proxies.clone())
    }

    /// Peers allowed to set X-Forwarded-For / X-Real-IP
    pub fn with_trusted_proxies(mut self, proxies: Vec<String>) -> Self {
        self.trusted_proxies = Arc::new(proxies);
        self
    }

    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();

        // Must run before `entry` takes a shard lock
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.evict_expired(now);
        }

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                window_start: now,
            });

        if now.duration_since(entry.window_start) >= self.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            RateDecision::Allowed {
                remaining: self.max_requests - entry.count,
            }
        } else {
            RateDecision::Limited {
                retry_after: self.window_duration - now.duration_since(entry.window_start),
            }
        }
    }

    /// Drop clients whose window has already closed
    fn evict_expired(&self, now: Instant) {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) < self.window_duration);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.entries.len(), "Evicted idle rate limit windows");
        }
    }
}

/// Rate limiting middleware transform
pub struct RateLimit {
    limiter: RateLimiter,
}

impl RateLimit {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: RateLimiter,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();

        Box::pin(async move {
            let client_ip = get_client_ip(&req, &limiter.trusted_proxies);

            match limiter.check(&client_ip) {
                RateDecision::Allowed { remaining } => {
                    debug!("Rate limit passed: ip={}, remaining={}", client_ip, remaining);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                RateDecision::Limited { retry_after } => {
                    // Round up so clients never retry inside the window
                    let retry_after = retry_after.as_secs().max(1);
                    warn!("Rate limit exceeded: ip={}, reset_in={}s", client_ip, retry_after);

                    let problem = ProblemDetails::rate_limit_error(Some(retry_after));
                    let mut response = HttpResponse::TooManyRequests()
                        .content_type("application/problem+json")
                        .json(problem);

                    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static("retry-after"), value);
                    }
                    response.headers_mut().insert(
                        HeaderName::from_static("x-ratelimit-remaining"),
                        HeaderValue::from_static("0"),
                    );

                    let (req, _) = req.into_parts();
                    Ok(ServiceResponse::new(req, response).map_into_right_body())
                }
            }
        })
    }
}

/// Client IP, honouring proxy headers only from trusted peers
fn get_client_ip(req: &ServiceRequest, trusted_proxies: &[String]) -> String {
    let peer_ip = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !trusted_proxies.iter().any(|trusted| trusted == &peer_ip) {
        if req.headers().contains_key("x-forwarded-for") || req.headers().contains_key("x-real-ip")
        {
            warn!("Ignoring proxy headers from untrusted IP: {}", peer_ip);
        }
        return peer_ip;
    }

    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    req.headers()
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or(peer_ip)
}
