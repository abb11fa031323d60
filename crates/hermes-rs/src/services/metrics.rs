//! Request metrics accumulation and Prometheus export.
//!
//! Three bucket dimensions are updated atomically per request: global,
//! per route pattern, and per target service. Latencies are kept in a
//! bounded ring buffer per bucket; percentiles are computed on demand by
//! sorting the window.

use ahash::HashMap as AHashMap;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default latency sample window per bucket.
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

/// Counters and the latency window for one dimension key.
#[derive(Debug, Default)]
pub struct MetricsBucket {
    pub request_count: u64,
    pub error_count: u64,
    pub total_latency_ms: f64,
    pub status_codes: AHashMap<u16, u64>,
    latencies: VecDeque<f64>,
}

impl MetricsBucket {
    fn record(&mut self, status_code: u16, latency_ms: f64, window_size: usize) {
        self.request_count += 1;
        self.total_latency_ms += latency_ms;
        *self.status_codes.entry(status_code).or_insert(0) += 1;

        if status_code >= 400 {
            self.error_count += 1;
        }

        self.latencies.push_back(latency_ms);
        while self.latencies.len() > window_size {
            self.latencies.pop_front();
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<f64> = self.latencies.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let index = ((sorted.len() as f64) * p / 100.0) as usize;
        sorted[index.min(sorted.len() - 1)]
    }

    fn avg_latency_ms(&self) -> f64 {
        if self.request_count == 0 {
            return 0.0;
        }
        self.total_latency_ms / self.request_count as f64
    }
}

#[derive(Debug, Default)]
struct MetricsInner {
    global: MetricsBucket,
    by_route: AHashMap<String, MetricsBucket>,
    by_service: AHashMap<String, MetricsBucket>,
}

/// Thread-safe metrics accumulator for the request pipeline.
///
/// One mutex covers the three dimensions so a request's counters move
/// together; the critical section is counter arithmetic and a bounded
/// window push, nothing more.
#[derive(Debug)]
pub struct MetricsCollector {
    window_size: usize,
    inner: Mutex<MetricsInner>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl MetricsCollector {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    /// Records one completed request in all three dimensions.
    pub fn record(
        &self,
        route_pattern: &str,
        target_service: &str,
        status_code: u16,
        latency_ms: f64,
    ) {
        let mut inner = self.inner.lock().unwrap();
        let window_size = self.window_size;

        inner.global.record(status_code, latency_ms, window_size);
        inner
            .by_route
            .entry(route_pattern.to_string())
            .or_default()
            .record(status_code, latency_ms, window_size);
        inner
            .by_service
            .entry(target_service.to_string())
            .or_default()
            .record(status_code, latency_ms, window_size);
    }

    /// Renders the Prometheus text exposition.
    pub fn export_prometheus(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut lines = Vec::new();

        lines.push("# HELP hermes_requests_total Total number of requests".to_string());
        lines.push("# TYPE hermes_requests_total counter".to_string());
        lines.push(format!(
            "hermes_requests_total {}",
            inner.global.request_count
        ));

        lines.push("# HELP hermes_errors_total Total number of errors".to_string());
        lines.push("# TYPE hermes_errors_total counter".to_string());
        lines.push(format!("hermes_errors_total {}", inner.global.error_count));

        if inner.global.request_count > 0 {
            lines.push("# HELP hermes_latency_avg_ms Average latency in milliseconds".to_string());
            lines.push("# TYPE hermes_latency_avg_ms gauge".to_string());
            lines.push(format!(
                "hermes_latency_avg_ms {:.2}",
                inner.global.avg_latency_ms()
            ));
        }

        for (p, name) in [(50.0, "p50"), (95.0, "p95"), (99.0, "p99")] {
            lines.push(format!(
                "# HELP hermes_latency_{}_ms {}th percentile latency",
                name,
                name.trim_start_matches('p')
            ));
            lines.push(format!("# TYPE hermes_latency_{}_ms gauge", name));
            lines.push(format!(
                "hermes_latency_{}_ms {:.2}",
                name,
                inner.global.percentile(p)
            ));
        }

        lines.push("# HELP hermes_route_requests_total Requests by route".to_string());
        lines.push("# TYPE hermes_route_requests_total counter".to_string());
        for (route, bucket) in &inner.by_route {
            lines.push(format!(
                "hermes_route_requests_total{{route=\"{}\"}} {}",
                escape_label(route),
                bucket.request_count
            ));
        }

        lines.push("# HELP hermes_route_errors_total Errors by route".to_string());
        lines.push("# TYPE hermes_route_errors_total counter".to_string());
        for (route, bucket) in &inner.by_route {
            lines.push(format!(
                "hermes_route_errors_total{{route=\"{}\"}} {}",
                escape_label(route),
                bucket.error_count
            ));
        }

        lines.push("# HELP hermes_service_requests_total Requests by service".to_string());
        lines.push("# TYPE hermes_service_requests_total counter".to_string());
        for (service, bucket) in &inner.by_service {
            lines.push(format!(
                "hermes_service_requests_total{{service=\"{}\"}} {}",
                escape_label(service),
                bucket.request_count
            ));
        }

        lines.push("# HELP hermes_service_errors_total Errors by service".to_string());
        lines.push("# TYPE hermes_service_errors_total counter".to_string());
        for (service, bucket) in &inner.by_service {
            lines.push(format!(
                "hermes_service_errors_total{{service=\"{}\"}} {}",
                escape_label(service),
                bucket.error_count
            ));
        }

        lines.join("\n")
    }

    /// JSON summary for the `/metrics/summary` endpoint.
    pub fn summary(&self) -> serde_json::Value {
        let inner = self.inner.lock().unwrap();
        let total = inner.global.request_count;
        let errors = inner.global.error_count;
        let error_rate = if total > 0 {
            errors as f64 / total as f64
        } else {
            0.0
        };

        json!({
            "total_requests": total,
            "total_errors": errors,
            "error_rate": error_rate,
            "avg_latency_ms": round2(inner.global.avg_latency_ms()),
            "p50_latency_ms": round2(inner.global.percentile(50.0)),
            "p95_latency_ms": round2(inner.global.percentile(95.0)),
            "p99_latency_ms": round2(inner.global.percentile(99.0)),
            "routes": inner.by_route.len(),
            "services": inner.by_service.len(),
        })
    }

    /// Global status-code distribution, for tests and diagnostics.
    pub fn status_code_count(&self, status_code: u16) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner
            .global
            .status_codes
            .get(&status_code)
            .copied()
            .unwrap_or(0)
    }
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_evicts_oldest_sample() {
        let collector = MetricsCollector::new(2);
        collector.record("/a", "svc", 200, 1.0);
        collector.record("/a", "svc", 200, 2.0);
        collector.record("/a", "svc", 200, 3.0);

        let inner = collector.inner.lock().unwrap();
        assert_eq!(inner.global.latencies.len(), 2);
        assert_eq!(inner.global.latencies.front().copied(), Some(2.0));
        assert_eq!(inner.global.request_count, 3);
    }

    #[test]
    fn label_quotes_are_escaped() {
        assert_eq!(escape_label("/api/\"v1\""), "/api/\\\"v1\\\"");
    }
}
