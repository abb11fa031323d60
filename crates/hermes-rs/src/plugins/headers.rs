//! Forwarding header preparation.
//!
//! Builds the header set sent upstream: everything from the client except
//! hop-by-hop headers and `host`, plus the tracing and `X-Forwarded-*`
//! headers the upstream expects from a gateway.

use crate::plugins::{GatewayContext, GatewayPlugin};
use async_trait::async_trait;

/// Headers defined as connection-specific by RFC 7230 §6.1.
/// These never travel upstream.
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

/// Header transform plugin, priority 300.
///
/// Injected headers: `X-Request-ID`, `X-Forwarded-For`, `X-Forwarded-Proto`,
/// `X-Forwarded-Host`, `X-Real-IP`, and `X-Forwarded-Prefix` when the route
/// strips a path prefix. The `host` header is dropped so the HTTP client
/// sets it from the upstream URL.
#[derive(Debug, Default)]
pub struct HeaderTransformPlugin;

impl HeaderTransformPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayPlugin for HeaderTransformPlugin {
    fn name(&self) -> &'static str {
        "header_transform"
    }

    fn priority(&self) -> i32 {
        300
    }

    async fn before_request(&self, ctx: &mut GatewayContext) {
        let mut forward_headers: Vec<(String, String)> =
            Vec::with_capacity(ctx.headers.len() + 6);

        for (name, value) in ctx.headers.iter() {
            let lower = name.as_str().to_lowercase();

            if HOP_BY_HOP_HEADERS.contains(&lower.as_str()) || lower == "host" {
                continue;
            }

            if let Ok(value) = value.to_str() {
                forward_headers.push((name.as_str().to_string(), value.to_string()));
            }
        }

        forward_headers.push(("X-Request-ID".to_string(), ctx.request_id.clone()));
        forward_headers.push(("X-Forwarded-For".to_string(), ctx.client_ip.clone()));
        forward_headers.push(("X-Forwarded-Proto".to_string(), ctx.scheme.clone()));
        forward_headers.push(("X-Forwarded-Host".to_string(), ctx.host.clone()));
        forward_headers.push(("X-Real-IP".to_string(), ctx.client_ip.clone()));

        if let Some(strip_path) = ctx.route.strip_path.as_deref() {
            if !strip_path.is_empty() {
                forward_headers.push(("X-Forwarded-Prefix".to_string(), strip_path.to_string()));
            }
        }

        ctx.forward_headers = Some(forward_headers);
    }
}
