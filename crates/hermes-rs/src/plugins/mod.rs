//! Plugin system for the request admission pipeline.
//!
//! A plugin is any value offering `before_request`, `after_response`, and
//! `on_error`. The chain invokes `before_request` in ascending priority
//! order and stops at the first short-circuit; `after_response` runs in
//! reverse order and may only touch response headers; `on_error` runs in
//! forward order and the first plugin returning a response wins.
//!
//! Default composition and priorities: authentication (50), rate limit
//! (100), circuit breaker (200), header transform (300).
//!
//! # Module Organization
//!
//! - [`auth`] - Bearer-token authentication with auth-service validation
//! - [`rate_limit`] - Token-bucket admission across three dimensions
//! - [`circuit_breaker`] - Per-upstream-service health state machine
//! - [`headers`] - Hop-by-hop stripping and forwarding header injection

pub mod auth;
pub mod circuit_breaker;
pub mod headers;
pub mod rate_limit;

use crate::models::error::GatewayError;
use crate::models::route::Route;
use actix_web::http::header::HeaderMap;
use actix_web::http::{Method, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default idle threshold and sweep interval for keyed plugin state.
pub const JANITOR_INTERVAL: Duration = Duration::from_secs(300);

/// A response produced inside the pipeline.
///
/// Used both for plugin short-circuits (429, 503, 401, 302) and for the
/// forwarder's rendition of the upstream response. Converted into an actix
/// `HttpResponse` only at the orchestrator edge, which keeps plugin futures
/// `Send` and the pipeline testable without an HTTP runtime.
#[derive(Debug)]
pub struct GatewayResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: web::Bytes,
}

impl GatewayResponse {
    /// Builds a JSON response with `content-type: application/json`.
    pub fn json(status: StatusCode, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: web::Bytes::from(body.to_string()),
        }
    }

    /// Builds a plain-text response.
    pub fn text(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            headers: vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: web::Bytes::from(body.to_string()),
        }
    }

    /// Adds a header, keeping any existing values with the same name.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets a header, replacing any existing value with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Renders the response for the HTTP layer.
    pub fn into_http_response(self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status);
        for (name, value) in &self.headers {
            builder.append_header((name.as_str(), value.as_str()));
        }
        builder.body(self.body)
    }
}

/// Per-request state threaded through the plugin chain.
///
/// Captures everything plugins need from the inbound request so the chain
/// never touches the actix request object after construction.
pub struct GatewayContext {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Raw query string, without the `?`.
    pub query: String,
    /// Snapshot of the inbound request headers.
    pub headers: HeaderMap,
    /// Client IP as reported by the connection info.
    pub client_ip: String,
    /// Request scheme (`http`/`https`).
    pub scheme: String,
    /// Host the client addressed, for `X-Forwarded-Host` and redirects.
    pub host: String,
    /// Request id, honored from the client or minted by the middleware.
    pub request_id: String,
    /// The matched route.
    pub route: Arc<Route>,
    /// Headers to send upstream, built by the header transform plugin.
    /// `None` means the forwarder falls back to filtering the originals.
    pub forward_headers: Option<Vec<(String, String)>>,
    /// Set by a plugin to end the pipeline without forwarding.
    pub short_circuit: Option<GatewayResponse>,
    /// Marked by the authentication plugin on a validated token.
    pub authenticated: bool,
}

impl GatewayContext {
    /// Builds the context from an inbound request and its matched route.
    pub fn from_request(req: &HttpRequest, route: Arc<Route>, request_id: String) -> Self {
        let connection_info = req.connection_info();
        let client_ip = connection_info
            .realip_remote_addr()
            .map(|addr| addr.split(':').next().unwrap_or(addr).to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let scheme = connection_info.scheme().to_string();
        let host = connection_info.host().to_string();
        drop(connection_info);

        Self {
            method: req.method().clone(),
            path: req.path().to_string(),
            query: req.query_string().to_string(),
            headers: req.headers().clone(),
            client_ip,
            scheme,
            host,
            request_id,
            route,
            forward_headers: None,
            short_circuit: None,
            authenticated: false,
        }
    }

    /// First value of a request header as a string, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The full URL the client requested, for login redirects.
    pub fn original_url(&self) -> String {
        if self.query.is_empty() {
            format!("{}://{}{}", self.scheme, self.host, self.path)
        } else {
            format!("{}://{}{}?{}", self.scheme, self.host, self.path, self.query)
        }
    }
}

/// A pipeline plugin.
///
/// Implementations must not hold locks across any `.await` point and must
/// not perform I/O inside keyed-state critical sections.
#[async_trait]
pub trait GatewayPlugin: Send + Sync {
    /// Plugin name, used in logs.
    fn name(&self) -> &'static str;

    /// Execution priority; lower runs earlier in `before_request`.
    fn priority(&self) -> i32;

    /// Disabled plugins are skipped by the chain.
    fn enabled(&self) -> bool {
        true
    }

    /// Pre-forward hook. May set `ctx.short_circuit` to end the pipeline.
    async fn before_request(&self, _ctx: &mut GatewayContext) {}

    /// Post-forward hook, reverse priority order. Header mutation only.
    async fn after_response(&self, _ctx: &GatewayContext, _response: &mut GatewayResponse) {}

    /// Error hook. The first plugin returning a response handles the error.
    async fn on_error(
        &self,
        _ctx: &GatewayContext,
        _error: &GatewayError,
    ) -> Option<GatewayResponse> {
        None
    }
}

/// Ordered plugin chain.
///
/// Registration keeps the list sorted by ascending priority, so
/// `execute_before` walks it forward and `execute_after` walks it in
/// reverse without re-sorting per request.
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn GatewayPlugin>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Registers a plugin, keeping priority order.
    pub fn register(&mut self, plugin: Arc<dyn GatewayPlugin>) {
        self.plugins.push(plugin);
        self.plugins.sort_by_key(|p| p.priority());
    }

    /// Registered plugins in execution order.
    pub fn plugins(&self) -> &[Arc<dyn GatewayPlugin>] {
        &self.plugins
    }

    /// Runs `before_request` hooks in priority order.
    ///
    /// Stops at the first plugin that sets a short-circuit response.
    pub async fn execute_before(&self, ctx: &mut GatewayContext) {
        for plugin in &self.plugins {
            if !plugin.enabled() {
                continue;
            }

            plugin.before_request(ctx).await;

            if ctx.short_circuit.is_some() {
                log::debug!(
                    "Plugin {} short-circuited {} {}",
                    plugin.name(),
                    ctx.method,
                    ctx.path
                );
                break;
            }
        }
    }

    /// Runs `after_response` hooks in reverse priority order.
    pub async fn execute_after(&self, ctx: &GatewayContext, response: &mut GatewayResponse) {
        for plugin in self.plugins.iter().rev() {
            if !plugin.enabled() {
                continue;
            }

            plugin.after_response(ctx, response).await;
        }
    }

    /// Offers the error to each plugin in priority order.
    pub async fn handle_error(
        &self,
        ctx: &GatewayContext,
        error: &GatewayError,
    ) -> Option<GatewayResponse> {
        for plugin in &self.plugins {
            if !plugin.enabled() {
                continue;
            }

            if let Some(response) = plugin.on_error(ctx, error).await {
                return Some(response);
            }
        }

        None
    }
}

/// The default plugin set with handles kept for the janitor.
pub struct DefaultPlugins {
    pub chain: Arc<PluginChain>,
    pub rate_limit: Arc<rate_limit::RateLimitPlugin>,
    pub circuit_breaker: Arc<circuit_breaker::CircuitBreakerPlugin>,
}

/// Builds the default chain: authentication (50), rate limit (100),
/// circuit breaker (200), header transform (300).
///
/// All four are registered; the settings-driven `enabled` flags gate
/// execution per request. The stateful plugins are returned alongside the
/// chain so the janitor can sweep their keyed maps.
pub fn create_default_plugin_chain(settings: &crate::models::settings::Settings) -> DefaultPlugins {
    let rate_limit = Arc::new(rate_limit::RateLimitPlugin::new(settings));
    let circuit_breaker = Arc::new(circuit_breaker::CircuitBreakerPlugin::new(settings));

    let mut chain = PluginChain::new();
    chain.register(Arc::new(auth::AuthenticationPlugin::new(
        settings.auth_plugin_enabled,
        settings.auth_degrade_allow,
    )));
    chain.register(Arc::clone(&rate_limit) as Arc<dyn GatewayPlugin>);
    chain.register(Arc::clone(&circuit_breaker) as Arc<dyn GatewayPlugin>);
    chain.register(Arc::new(headers::HeaderTransformPlugin::new()));

    DefaultPlugins {
        chain: Arc::new(chain),
        rate_limit,
        circuit_breaker,
    }
}

/// Spawns the janitor that reaps idle keyed plugin state.
///
/// Sweeps the rate limiter's route/IP buckets and the circuit breaker map
/// on every tick, evicting entries idle for longer than the interval. The
/// task ends when the shutdown channel flips.
pub fn spawn_janitor_task(
    rate_limit: Arc<rate_limit::RateLimitPlugin>,
    circuit_breaker: Arc<circuit_breaker::CircuitBreakerPlugin>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cleaned = rate_limit.cleanup_stale(interval)
                        + circuit_breaker.cleanup_stale(interval);
                    if cleaned > 0 {
                        log::info!("Janitor evicted {} idle entries", cleaned);
                    }
                }
                _ = shutdown.changed() => {
                    log::info!("Janitor task stopping");
                    break;
                }
            }
        }
    })
}
