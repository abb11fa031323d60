//! Tests for plugin chain ordering, short-circuits, and error handling.

use actix_web::http::StatusCode;
use actix_web::test::TestRequest;
use async_trait::async_trait;
use hermes_rs::models::error::GatewayError;
use hermes_rs::models::route::{Route, ServiceInstance};
use hermes_rs::plugins::{GatewayContext, GatewayPlugin, GatewayResponse, PluginChain};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn route() -> Arc<Route> {
    Arc::new(Route {
        id: 1,
        path_pattern: "/api/**".to_string(),
        methods: "*".to_string(),
        target_service_id: "svc".to_string(),
        target_service: ServiceInstance {
            id: "svc-1".to_string(),
            name: "svc".to_string(),
            host: "localhost".to_string(),
            port: 9000,
            protocol: "http".to_string(),
            status: "healthy".to_string(),
            weight: 1,
            healthy: true,
        },
        strip_prefix: false,
        strip_path: None,
        priority: 0,
        enabled: true,
        auth_config: None,
        auth_service: None,
        is_local: false,
    })
}

fn context() -> GatewayContext {
    let req = TestRequest::default().to_http_request();
    GatewayContext::from_request(&req, route(), "req-1".to_string())
}

/// Records hook invocations into a shared log.
struct ProbePlugin {
    name: &'static str,
    priority: i32,
    log: Arc<Mutex<Vec<String>>>,
    short_circuit: bool,
    handles_errors: bool,
}

#[async_trait]
impl GatewayPlugin for ProbePlugin {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn before_request(&self, ctx: &mut GatewayContext) {
        self.log.lock().unwrap().push(format!("before:{}", self.name));
        if self.short_circuit {
            ctx.short_circuit = Some(GatewayResponse::json(
                StatusCode::TOO_MANY_REQUESTS,
                json!({"by": self.name}),
            ));
        }
    }

    async fn after_response(&self, _ctx: &GatewayContext, _response: &mut GatewayResponse) {
        self.log.lock().unwrap().push(format!("after:{}", self.name));
    }

    async fn on_error(
        &self,
        _ctx: &GatewayContext,
        _error: &GatewayError,
    ) -> Option<GatewayResponse> {
        self.log.lock().unwrap().push(format!("error:{}", self.name));
        if self.handles_errors {
            Some(GatewayResponse::json(
                StatusCode::BAD_GATEWAY,
                json!({"handled_by": self.name}),
            ))
        } else {
            None
        }
    }
}

fn probe(
    name: &'static str,
    priority: i32,
    log: &Arc<Mutex<Vec<String>>>,
    short_circuit: bool,
    handles_errors: bool,
) -> Arc<dyn GatewayPlugin> {
    Arc::new(ProbePlugin {
        name,
        priority,
        log: Arc::clone(log),
        short_circuit,
        handles_errors,
    })
}

#[tokio::test]
async fn before_runs_in_ascending_priority_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = PluginChain::new();
    // Registered out of order on purpose
    chain.register(probe("breaker", 200, &log, false, false));
    chain.register(probe("auth", 50, &log, false, false));
    chain.register(probe("limiter", 100, &log, false, false));

    let mut ctx = context();
    chain.execute_before(&mut ctx).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["before:auth", "before:limiter", "before:breaker"]
    );
}

#[tokio::test]
async fn after_runs_in_reverse_priority_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = PluginChain::new();
    chain.register(probe("auth", 50, &log, false, false));
    chain.register(probe("headers", 300, &log, false, false));

    let ctx = context();
    let mut response = GatewayResponse::json(StatusCode::OK, json!({}));
    chain.execute_after(&ctx, &mut response).await;

    assert_eq!(*log.lock().unwrap(), vec!["after:headers", "after:auth"]);
}

#[tokio::test]
async fn short_circuit_stops_remaining_before_hooks() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = PluginChain::new();
    chain.register(probe("auth", 50, &log, false, false));
    chain.register(probe("limiter", 100, &log, true, false));
    chain.register(probe("breaker", 200, &log, false, false));

    let mut ctx = context();
    chain.execute_before(&mut ctx).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["before:auth", "before:limiter"]
    );

    let response = ctx.short_circuit.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["by"], "limiter");
}

#[tokio::test]
async fn first_error_handler_wins() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = PluginChain::new();
    chain.register(probe("auth", 50, &log, false, false));
    chain.register(probe("limiter", 100, &log, false, true));
    chain.register(probe("breaker", 200, &log, false, true));

    let ctx = context();
    let error = GatewayError::Internal {
        message: "boom".to_string(),
    };
    let response = chain.handle_error(&ctx, &error).await.unwrap();

    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["handled_by"], "limiter");
    assert_eq!(
        *log.lock().unwrap(),
        vec!["error:auth", "error:limiter"]
    );
}

#[tokio::test]
async fn unhandled_error_returns_none() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut chain = PluginChain::new();
    chain.register(probe("auth", 50, &log, false, false));

    let ctx = context();
    let error = GatewayError::Internal {
        message: "boom".to_string(),
    };
    assert!(chain.handle_error(&ctx, &error).await.is_none());
}

#[tokio::test]
async fn response_header_set_replaces_value() {
    let mut response = GatewayResponse::json(StatusCode::OK, json!({}));
    response.set_header("X-Circuit-State", "closed");
    response.set_header("X-Circuit-State", "open");

    assert_eq!(response.header("X-Circuit-State"), Some("open"));
    assert_eq!(
        response
            .headers
            .iter()
            .filter(|(n, _)| n == "X-Circuit-State")
            .count(),
        1
    );
}
