//! Metrics endpoints.
//!
//! `GET /metrics` renders the Prometheus text exposition from the shared
//! collector; `GET /metrics/summary` answers a JSON digest for dashboards.

use crate::services::metrics::MetricsCollector;
use actix_web::{web, HttpResponse, Result};
use std::sync::Arc;

/// Prometheus text exposition.
pub async fn metrics_endpoint(metrics: web::Data<Arc<MetricsCollector>>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(metrics.export_prometheus()))
}

/// JSON metrics digest.
pub async fn metrics_summary(metrics: web::Data<Arc<MetricsCollector>>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(metrics.summary()))
}

/// Registers the metrics endpoints.
pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_endpoint))
        .route("/metrics/summary", web::get().to(metrics_summary));
}
