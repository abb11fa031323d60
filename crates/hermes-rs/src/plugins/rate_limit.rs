//! Token-bucket rate limiting across three dimensions.
//!
//! Admission is checked global first, then per route pattern, then per
//! client IP. Each dimension refills at its configured QPS with a burst
//! capacity of `rate * burst_multiplier`. Keyed buckets are created lazily
//! and reaped by the janitor once idle.

use crate::models::settings::Settings;
use crate::plugins::{GatewayContext, GatewayPlugin, GatewayResponse};
use actix_web::http::StatusCode;
use ahash::HashMap as AHashMap;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A token bucket with lazy refill.
///
/// Tokens are advanced to "now" before every acquisition attempt, so no
/// timer is needed per bucket. `last_refill` doubles as the idle marker the
/// janitor sweeps on.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket. Capacity is `rate * burst_multiplier`,
    /// floored at one token so a fresh bucket always admits one request.
    pub fn new(refill_rate: f64, burst_multiplier: f64) -> Self {
        let capacity = (refill_rate * burst_multiplier).max(1.0);
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    /// Attempts to take one token, refilling lazily first.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(self.last_refill)
    }
}

/// Rate limit plugin, priority 100.
///
/// The global bucket lives for the process; route and IP buckets are keyed
/// maps guarded by one mutex each, with creation-on-miss inside the
/// critical section and no I/O while held.
pub struct RateLimitPlugin {
    enabled: bool,
    per_route_rate: f64,
    per_ip_rate: f64,
    burst_multiplier: f64,
    global_bucket: Mutex<TokenBucket>,
    route_buckets: Mutex<AHashMap<String, TokenBucket>>,
    ip_buckets: Mutex<AHashMap<String, TokenBucket>>,
}

impl RateLimitPlugin {
    pub fn new(settings: &Settings) -> Self {
        Self {
            enabled: settings.rate_limit_enabled,
            per_route_rate: settings.rate_limit_per_route_qps,
            per_ip_rate: settings.rate_limit_per_ip_qps,
            burst_multiplier: settings.rate_limit_burst_multiplier,
            global_bucket: Mutex::new(TokenBucket::new(
                settings.rate_limit_global_qps,
                settings.rate_limit_burst_multiplier,
            )),
            route_buckets: Mutex::new(AHashMap::default()),
            ip_buckets: Mutex::new(AHashMap::default()),
        }
    }

    /// Evicts route and IP buckets idle for longer than `max_idle`.
    ///
    /// The global bucket is never evicted. Returns the number of buckets
    /// removed; called by the janitor task.
    pub fn cleanup_stale(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut cleaned = 0;

        {
            let mut route_buckets = self.route_buckets.lock().unwrap();
            let before = route_buckets.len();
            route_buckets.retain(|_, bucket| bucket.idle_for(now) <= max_idle);
            cleaned += before - route_buckets.len();
        }

        {
            let mut ip_buckets = self.ip_buckets.lock().unwrap();
            let before = ip_buckets.len();
            ip_buckets.retain(|_, bucket| bucket.idle_for(now) <= max_idle);
            cleaned += before - ip_buckets.len();
        }

        if cleaned > 0 {
            log::debug!("Evicted {} stale token buckets", cleaned);
        }

        cleaned
    }

    fn rejected(limit_type: &str) -> GatewayResponse {
        GatewayResponse::json(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": "Too Many Requests", "type": limit_type}),
        )
        .with_header("Retry-After", "1")
        .with_header("X-RateLimit-Type", limit_type)
    }
}

#[async_trait]
impl GatewayPlugin for RateLimitPlugin {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn before_request(&self, ctx: &mut GatewayContext) {
        if !self.global_bucket.lock().unwrap().try_acquire() {
            log::warn!("Global rate limit hit by {} on {}", ctx.client_ip, ctx.path);
            ctx.short_circuit = Some(Self::rejected("global"));
            return;
        }

        let route_key = ctx.route.path_pattern.clone();
        {
            let mut route_buckets = self.route_buckets.lock().unwrap();
            let bucket = route_buckets
                .entry(route_key.clone())
                .or_insert_with(|| TokenBucket::new(self.per_route_rate, self.burst_multiplier));
            if !bucket.try_acquire() {
                log::warn!("Route rate limit hit on {}", route_key);
                ctx.short_circuit = Some(Self::rejected("route"));
                return;
            }
        }

        {
            let mut ip_buckets = self.ip_buckets.lock().unwrap();
            let bucket = ip_buckets
                .entry(ctx.client_ip.clone())
                .or_insert_with(|| TokenBucket::new(self.per_ip_rate, self.burst_multiplier));
            if !bucket.try_acquire() {
                log::warn!("IP rate limit hit by {}", ctx.client_ip);
                ctx.short_circuit = Some(Self::rejected("ip"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bucket_admits_at_least_one() {
        let mut bucket = TokenBucket::new(0.1, 1.0);
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn tokens_never_exceed_capacity() {
        let mut bucket = TokenBucket::new(100.0, 1.5);
        // Drain one, then refill over a simulated long idle period
        assert!(bucket.try_acquire());
        if let Some(past) = Instant::now().checked_sub(Duration::from_secs(60)) {
            bucket.last_refill = past;
        }
        assert!(bucket.try_acquire());
        assert!(bucket.tokens <= bucket.capacity);
    }
}
