//! The catch-all proxy handler.
//!
//! Drives the pipeline for every request the named endpoints don't claim:
//! route matching, the plugin chain's pre-request hooks, instance
//! selection, upstream forwarding, reverse-order post hooks, and metrics
//! recording. Connection counts are guarded so they return to their prior
//! value on every exit path.

use crate::models::error::GatewayError;
use crate::plugins::{GatewayContext, GatewayResponse, PluginChain};
use crate::registry::route_table::RouteTable;
use crate::services::balancer::{Balancer, ConnectionTracker};
use crate::services::metrics::MetricsCollector;
use crate::services::proxy::ProxyForwarder;
use crate::middleware::request_id::request_id_for;
use crate::utils::route_matcher::RouteMatcher;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Everything the proxy handler needs, wired once at startup.
pub struct GatewayState {
    pub table: Arc<RouteTable>,
    pub matcher: Arc<RouteMatcher>,
    pub chain: Arc<PluginChain>,
    pub balancer: Arc<dyn Balancer>,
    pub tracker: Arc<ConnectionTracker>,
    pub forwarder: ProxyForwarder,
    pub metrics: Arc<MetricsCollector>,
}

/// Handles one proxied request end to end.
///
/// Sequence: resolve the route against the current table snapshot, build
/// the context, run `before` hooks (returning any short-circuit directly),
/// pick an instance, forward under a connection guard, run `after` hooks in
/// reverse, record metrics. Errors escaping the forwarder are offered to
/// the plugins' error hooks; unhandled ones become a 502.
pub async fn gateway_handler(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<GatewayState>,
) -> Result<HttpResponse, GatewayError> {
    let start = Instant::now();
    let request_id = request_id_for(&req);

    let routes = state.table.get_routes();
    let route = state
        .matcher
        .find_match(&routes, req.method().as_str(), req.path())
        .ok_or_else(|| GatewayError::RouteNotFound {
            path: req.path().to_string(),
        })?;

    let mut ctx = GatewayContext::from_request(&req, Arc::clone(&route), request_id);

    state.chain.execute_before(&mut ctx).await;
    if let Some(short_circuit) = ctx.short_circuit.take() {
        return Ok(short_circuit.into_http_response());
    }

    let instances = [route.target_service.clone()];
    let instance =
        state
            .balancer
            .select(&instances)
            .ok_or_else(|| GatewayError::NoHealthyInstance {
                service: route.target_service_id.clone(),
            })?;

    let forwarded = {
        let _guard = state.tracker.acquire(&instance.id);
        state.forwarder.forward(&ctx, &instance, body).await
    };

    let mut response = match forwarded {
        Ok(response) => response,
        Err(error) => {
            log::error!(
                "Forwarding {} {} failed: {}",
                ctx.method,
                ctx.path,
                error
            );

            let handled = state.chain.handle_error(&ctx, &error).await;
            let response = handled.unwrap_or_else(|| {
                GatewayResponse::json(
                    StatusCode::BAD_GATEWAY,
                    json!({"error": "Bad Gateway", "message": "Gateway error"}),
                )
            });
            return Ok(response.into_http_response());
        }
    };

    state.chain.execute_after(&ctx, &mut response).await;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    state.metrics.record(
        &route.path_pattern,
        &route.target_service_id,
        response.status.as_u16(),
        latency_ms,
    );

    Ok(response.into_http_response())
}

/// Registers the catch-all route. Must be configured last so the named
/// endpoints (health, metrics) keep precedence.
pub fn configure_gateway(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::route().to(gateway_handler));
}
