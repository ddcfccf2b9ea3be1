use super::{client_ip, Filter, Next};
use crate::error::IntakeError;
use crate::AppError;
use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use lru::LruCache;
use metrics::counter;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

/// Source IPs tracked at once; the least recently seen bucket is evicted.
pub const RATE_LIMIT_CACHE_SIZE: usize = 1000;

/// Burst capacity as a multiple of the steady-state rate.
const BURST_MULTIPLIER: f64 = 2.0;

/// Classic token bucket: refills at `rate` tokens per second up to `capacity`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// A bucket that starts full.
    pub fn new(rate: f64, capacity: f64, now: Instant) -> Self {
        Self {
            rate,
            capacity,
            tokens: capacity,
            last: now,
        }
    }

    /// Take one token if available.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-IP token buckets kept in a bounded LRU.
///
/// Lookup, creation and consumption happen under one lock, so concurrent
/// first requests from the same IP share a single bucket.
pub struct IpRateLimiter {
    buckets: Mutex<LruCache<String, TokenBucket>>,
    rate: f64,
    burst: f64,
}

impl IpRateLimiter {
    pub fn new(events_per_second: u32, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        let rate = f64::from(events_per_second);
        Self {
            buckets: Mutex::new(LruCache::new(cache_size)),
            rate,
            burst: rate * BURST_MULTIPLIER,
        }
    }

    pub fn allow(&self, ip: &str) -> bool {
        self.allow_at(ip, Instant::now())
    }

    pub fn allow_at(&self, ip: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get_mut(ip) {
            return bucket.try_acquire(now);
        }

        let mut bucket = TokenBucket::new(self.rate, self.burst, now);
        let allowed = bucket.try_acquire(now);
        buckets.put(ip.to_string(), bucket);
        allowed
    }

    /// Number of IPs currently tracked.
    pub fn tracked(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// Rate limits requests by client IP.
///
/// The key is the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer from `ConnectInfo`. A request with none of these (only possible
/// when the router is served without connect info) is keyed by the empty
/// string, so all such requests share one bucket.
pub struct RateLimit {
    limiter: Arc<IpRateLimiter>,
}

impl RateLimit {
    pub fn new(limiter: Arc<IpRateLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Filter for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn call(&self, req: Request, next: Next<'_>) -> Response {
        let ip = client_ip(req.headers(), req.extensions()).unwrap_or_default();
        if !self.limiter.allow(&ip) {
            counter!("apm_intake.rate_limit.denied", 1);
            return AppError::new(IntakeError::RateLimited, req.headers()).into_response();
        }
        next.run(req).await
    }
}
