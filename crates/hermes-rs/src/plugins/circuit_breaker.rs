//! Circuit breaking per upstream service.
//!
//! One breaker per target service id, created lazily and reaped by the
//! janitor when idle. Upstream 5xx statuses, transport failures, and
//! errors escaping the forwarder all count as failures; 4xx does not.

use crate::models::error::GatewayError;
use crate::models::settings::Settings;
use crate::plugins::{GatewayContext, GatewayPlugin, GatewayResponse};
use actix_web::http::StatusCode;
use ahash::HashMap as AHashMap;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// State of a circuit breaker.
///
/// # States
///
/// * `Closed` - normal operation, requests pass through
/// * `Open` - tripped, requests are rejected without reaching the upstream
/// * `HalfOpen` - cool-down elapsed, probe requests are admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Wire representation used in the `X-Circuit-State` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// The per-service state machine.
///
/// ```text
/// CLOSED -(failures >= threshold)-> OPEN -(timeout elapsed)-> HALF_OPEN
///    ^                                ^                           |
///    |                                +--------(failure)----------+
///    +---------(successes >= threshold in HALF_OPEN)--------------+
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, success_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            timeout,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
        }
    }

    /// Admission check.
    ///
    /// In `Open`, flips to `HalfOpen` and admits once the cool-down since
    /// the last failure has elapsed; rejects otherwise. `Closed` and
    /// `HalfOpen` always admit.
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = self
                    .last_failure_time
                    .map(|t| t.elapsed() >= self.timeout)
                    .unwrap_or(true);

                if cooled_down {
                    self.state = CircuitState::HalfOpen;
                    self.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful upstream outcome.
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.success_threshold {
                    self.reset();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed upstream outcome.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            CircuitState::HalfOpen => self.trip(),
            CircuitState::Closed if self.failure_count >= self.failure_threshold => self.trip(),
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.failure_count = 0;
        self.success_count = 0;
        log::warn!("Circuit breaker opened");
    }

    fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        log::info!("Circuit breaker closed - service recovered");
    }
}

#[derive(Debug)]
struct BreakerEntry {
    breaker: CircuitBreaker,
    last_seen: Instant,
}

/// Circuit breaker plugin, priority 200.
///
/// The breaker map is guarded by one mutex; creation-on-miss and state
/// transitions happen inside the critical section, which performs no I/O.
pub struct CircuitBreakerPlugin {
    enabled: bool,
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    breakers: Mutex<AHashMap<String, BreakerEntry>>,
}

impl CircuitBreakerPlugin {
    pub fn new(settings: &Settings) -> Self {
        Self {
            enabled: settings.circuit_breaker_enabled,
            failure_threshold: settings.circuit_breaker_failure_threshold,
            success_threshold: settings.circuit_breaker_success_threshold,
            timeout: settings.circuit_breaker_timeout,
            breakers: Mutex::new(AHashMap::default()),
        }
    }

    /// Evicts breakers untouched for longer than `max_idle`.
    pub fn cleanup_stale(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut breakers = self.breakers.lock().unwrap();
        let before = breakers.len();
        breakers.retain(|_, entry| now.duration_since(entry.last_seen) <= max_idle);
        let cleaned = before - breakers.len();

        if cleaned > 0 {
            log::debug!("Evicted {} idle circuit breakers", cleaned);
        }

        cleaned
    }

    /// Current state snapshot of a breaker, if one exists.
    pub fn breaker_state(&self, service_id: &str) -> Option<(CircuitState, u32, u32)> {
        let breakers = self.breakers.lock().unwrap();
        breakers.get(service_id).map(|entry| {
            (
                entry.breaker.state(),
                entry.breaker.failure_count(),
                entry.breaker.success_count(),
            )
        })
    }

    fn with_breaker<R>(&self, service_id: &str, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let mut breakers = self.breakers.lock().unwrap();
        let entry = breakers
            .entry(service_id.to_string())
            .or_insert_with(|| BreakerEntry {
                breaker: CircuitBreaker::new(
                    self.failure_threshold,
                    self.success_threshold,
                    self.timeout,
                ),
                last_seen: Instant::now(),
            });
        entry.last_seen = Instant::now();
        f(&mut entry.breaker)
    }

    fn rejected(&self, service_id: &str, state: CircuitState) -> GatewayResponse {
        GatewayResponse::json(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "error": "Service Unavailable",
                "reason": "circuit_open",
                "service": service_id,
            }),
        )
        .with_header("Retry-After", &self.timeout.as_secs().to_string())
        .with_header("X-Circuit-State", state.as_str())
    }
}

#[async_trait]
impl GatewayPlugin for CircuitBreakerPlugin {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn priority(&self) -> i32 {
        200
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn before_request(&self, ctx: &mut GatewayContext) {
        let service_id = ctx.route.target_service_id.clone();

        let admitted = self.with_breaker(&service_id, |breaker| {
            (breaker.allow_request(), breaker.state())
        });

        if !admitted.0 {
            log::warn!("Circuit breaker rejected request to {}", service_id);
            ctx.short_circuit = Some(self.rejected(&service_id, admitted.1));
        }
    }

    async fn after_response(&self, ctx: &GatewayContext, response: &mut GatewayResponse) {
        let service_id = ctx.route.target_service_id.clone();

        let state = self.with_breaker(&service_id, |breaker| {
            if response.status.as_u16() >= 500 {
                breaker.record_failure();
            } else {
                breaker.record_success();
            }
            breaker.state()
        });

        response.set_header("X-Circuit-State", state.as_str());
    }

    async fn on_error(
        &self,
        ctx: &GatewayContext,
        _error: &GatewayError,
    ) -> Option<GatewayResponse> {
        let service_id = ctx.route.target_service_id.clone();
        self.with_breaker(&service_id, |breaker| breaker.record_failure());
        None
    }
}
