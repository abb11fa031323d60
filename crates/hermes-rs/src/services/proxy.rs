//! Upstream request forwarding.
//!
//! Rewrites the request URL for the chosen instance, forwards the body with
//! the prepared header set, and maps transport failures onto gateway status
//! codes: exhausted retries become 502, a timeout becomes 504. Upstream
//! responses, including 5xx, pass through as-is; redirects are returned to
//! the client, never followed.

use crate::models::error::GatewayError;
use crate::models::route::{Route, ServiceInstance};
use crate::models::settings::Settings;
use crate::plugins::{GatewayContext, GatewayResponse};
use actix_web::http::StatusCode;
use actix_web::web;
use log::{debug, warn};
use reqwest::header::{HeaderMap as ReqwestHeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

/// Response headers never forwarded back to the client.
///
/// The body is re-framed by the gateway's HTTP server, and reqwest has
/// already decompressed the payload.
const STRIP_RESPONSE_HEADERS: &[&str] = &["content-encoding", "content-length", "transfer-encoding"];

/// Request headers never forwarded upstream when no transform plugin ran.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Rewrites the request path for the upstream service.
///
/// When the route strips a prefix and the path carries it, the prefix is
/// removed; an emptied path becomes `/` and the result always starts
/// with `/`.
pub fn build_upstream_path(route: &Route, request_path: &str) -> String {
    let mut upstream_path = request_path.to_string();

    if route.strip_prefix {
        if let Some(strip_path) = route.strip_path.as_deref() {
            let prefix = strip_path.trim_end_matches('/');
            if let Some(rest) = request_path.strip_prefix(prefix) {
                upstream_path = if rest.is_empty() {
                    "/".to_string()
                } else {
                    rest.to_string()
                };
            }
        }
    }

    if !upstream_path.starts_with('/') {
        upstream_path = format!("/{}", upstream_path);
    }

    upstream_path
}

/// Builds the full upstream URL from the instance base, the rewritten path,
/// and the original query string.
pub fn build_upstream_url(
    route: &Route,
    instance: &ServiceInstance,
    request_path: &str,
    query: &str,
) -> String {
    let base_url = instance.base_url();
    let upstream_path = build_upstream_path(route, request_path);

    if query.is_empty() {
        format!("{}{}", base_url, upstream_path)
    } else {
        format!("{}{}?{}", base_url, upstream_path, query)
    }
}

/// The upstream proxy forwarder.
///
/// Holds one pooled HTTP client for the process. Redirects are disabled so
/// 3xx responses reach the client untouched.
#[derive(Clone)]
pub struct ProxyForwarder {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl ProxyForwarder {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .build()
            .expect("Failed to create upstream HTTP client");

        Self {
            client,
            timeout: settings.proxy_timeout,
            max_retries: settings.proxy_max_retries,
            retry_delay: settings.proxy_retry_delay,
        }
    }

    /// Forwards the request to the chosen instance.
    ///
    /// Transport errors are retried up to `max_retries` times with a fixed
    /// delay; a timeout is terminal. Expected upstream failures surface as
    /// 502/504 JSON responses so the circuit breaker observes them like any
    /// other status; only failures inside the forwarder itself (e.g. the
    /// response body stream breaking) come back as errors.
    pub async fn forward(
        &self,
        ctx: &GatewayContext,
        instance: &ServiceInstance,
        body: web::Bytes,
    ) -> Result<GatewayResponse, GatewayError> {
        let start = Instant::now();
        let upstream_url = build_upstream_url(&ctx.route, instance, &ctx.path, &ctx.query);
        let method = reqwest::Method::from_bytes(ctx.method.as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let headers = self.upstream_headers(ctx);

        let mut attempt: u32 = 0;
        let response = loop {
            let request = self
                .client
                .request(method.clone(), &upstream_url)
                .headers(headers.clone())
                .body(body.to_vec());

            match timeout(self.timeout, request.send()).await {
                Ok(Ok(upstream)) => break self.render_response(upstream, &upstream_url).await?,
                Ok(Err(e)) => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        warn!(
                            "Transport error to {} (attempt {}/{}): {}",
                            upstream_url, attempt, self.max_retries, e
                        );
                        sleep(self.retry_delay).await;
                        continue;
                    }

                    warn!("Upstream unreachable after {} retries: {}", attempt, e);
                    break GatewayResponse::json(
                        StatusCode::BAD_GATEWAY,
                        json!({
                            "error": "Bad Gateway",
                            "message": "Upstream service connection failed",
                        }),
                    );
                }
                Err(_) => {
                    warn!(
                        "Upstream {} timed out after {:?}",
                        upstream_url, self.timeout
                    );
                    break GatewayResponse::json(
                        StatusCode::GATEWAY_TIMEOUT,
                        json!({
                            "error": "Gateway Timeout",
                            "message": "Upstream service timed out",
                        }),
                    );
                }
            }
        };

        debug!(
            "{} {} -> {} {} in {:.1}ms",
            ctx.method,
            ctx.path,
            instance.id,
            response.status.as_u16(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(response)
    }

    /// Converts the client headers into the upstream header map.
    ///
    /// Prefers the set prepared by the header transform plugin; falls back
    /// to filtering the originals when the plugin did not run.
    fn upstream_headers(&self, ctx: &GatewayContext) -> ReqwestHeaderMap {
        let mut headers = ReqwestHeaderMap::with_capacity(ctx.headers.len());

        if let Some(forward_headers) = &ctx.forward_headers {
            for (name, value) in forward_headers {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    headers.append(name, value);
                }
            }
            return headers;
        }

        for (name, value) in ctx.headers.iter() {
            let lower = name.as_str().to_lowercase();
            if HOP_BY_HOP_HEADERS.contains(&lower.as_str()) || lower == "host" {
                continue;
            }

            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_ref()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }

        headers
    }

    async fn render_response(
        &self,
        upstream: reqwest::Response,
        upstream_url: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);

        let mut headers = Vec::with_capacity(upstream.headers().len());
        for (name, value) in upstream.headers() {
            let lower = name.as_str().to_lowercase();
            if STRIP_RESPONSE_HEADERS.contains(&lower.as_str()) {
                continue;
            }

            if let Ok(value) = value.to_str() {
                headers.push((name.as_str().to_string(), value.to_string()));
            }
        }

        match upstream.bytes().await {
            Ok(bytes) => Ok(GatewayResponse {
                status,
                headers,
                body: web::Bytes::from(bytes),
            }),
            Err(e) => {
                warn!("Failed reading upstream body from {}: {}", upstream_url, e);
                Err(GatewayError::Internal {
                    message: "Upstream response body could not be read".to_string(),
                })
            }
        }
    }
}
