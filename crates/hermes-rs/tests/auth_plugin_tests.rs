//! Tests for the authentication plugin's local decisions: public paths,
//! token extraction, and denial responses. Auth-service validation is
//! covered by the degraded-mode policy tests around reachability.

use actix_web::http::StatusCode;
use actix_web::test::TestRequest;
use hermes_rs::models::route::{AuthConfig, Route, ServiceInstance};
use hermes_rs::plugins::auth::{build_redirect_url, AuthenticationPlugin};
use hermes_rs::plugins::{GatewayContext, GatewayPlugin};
use std::sync::Arc;

fn protected_route(public_paths: Vec<&str>, login_redirect: Option<&str>) -> Arc<Route> {
    Arc::new(Route {
        id: 1,
        path_pattern: "/app/**".to_string(),
        methods: "*".to_string(),
        target_service_id: "app".to_string(),
        target_service: ServiceInstance {
            id: "app-1".to_string(),
            name: "app".to_string(),
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
        auth_config: Some(AuthConfig {
            require_auth: true,
            public_paths: public_paths.into_iter().map(|p| p.to_string()).collect(),
            login_redirect: login_redirect.map(|u| u.to_string()),
        }),
        auth_service: None,
        is_local: false,
    })
}

fn context_for(req: TestRequest, route: Arc<Route>) -> GatewayContext {
    let req = req.to_http_request();
    GatewayContext::from_request(&req, route, "req-1".to_string())
}

#[tokio::test]
async fn route_without_auth_config_passes() {
    let plugin = AuthenticationPlugin::new(true, false);
    let mut route = (*protected_route(vec![], None)).clone();
    route.auth_config = None;

    let mut ctx = context_for(TestRequest::get().uri("/app/x"), Arc::new(route));
    plugin.before_request(&mut ctx).await;
    assert!(ctx.short_circuit.is_none());
}

#[tokio::test]
async fn public_path_skips_authentication() {
    let plugin = AuthenticationPlugin::new(true, false);
    let route = protected_route(vec!["/app/docs/**"], None);

    let mut ctx = context_for(TestRequest::get().uri("/app/docs/index.html"), route);
    plugin.before_request(&mut ctx).await;
    assert!(ctx.short_circuit.is_none());
    assert!(!ctx.authenticated);
}

#[tokio::test]
async fn api_request_without_token_gets_json_401() {
    let plugin = AuthenticationPlugin::new(true, false);
    let route = protected_route(vec![], Some("/login"));

    let mut ctx = context_for(
        TestRequest::get()
            .uri("/app/data")
            .insert_header(("Accept", "application/json")),
        route,
    );
    plugin.before_request(&mut ctx).await;

    let denial = ctx.short_circuit.expect("expected denial");
    assert_eq!(denial.status, StatusCode::UNAUTHORIZED);
    assert_eq!(denial.header("WWW-Authenticate"), Some("Bearer"));
    let body: serde_json::Value = serde_json::from_slice(&denial.body).unwrap();
    assert_eq!(body["code"], "AUTH_REQUIRED");
}

#[tokio::test]
async fn xhr_request_gets_json_401() {
    let plugin = AuthenticationPlugin::new(true, false);
    let route = protected_route(vec![], Some("/login"));

    let mut ctx = context_for(
        TestRequest::get()
            .uri("/app/data")
            .insert_header(("X-Requested-With", "XMLHttpRequest")),
        route,
    );
    plugin.before_request(&mut ctx).await;

    let denial = ctx.short_circuit.expect("expected denial");
    assert_eq!(denial.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn browser_request_redirects_with_merged_query() {
    let plugin = AuthenticationPlugin::new(true, false);
    let route = protected_route(vec![], Some("/login?x=1"));

    let mut ctx = context_for(
        TestRequest::get()
            .uri("/protected")
            .insert_header(("Accept", "text/html")),
        route,
    );
    plugin.before_request(&mut ctx).await;

    let denial = ctx.short_circuit.expect("expected redirect");
    assert_eq!(denial.status, StatusCode::FOUND);
    assert_eq!(
        denial.header("Location"),
        Some("/login?x=1&redirect=%2Fprotected")
    );
}

#[tokio::test]
async fn browser_request_without_redirect_gets_plain_401() {
    let plugin = AuthenticationPlugin::new(true, false);
    let route = protected_route(vec![], None);

    let mut ctx = context_for(
        TestRequest::get()
            .uri("/app/page")
            .insert_header(("Accept", "text/html")),
        route,
    );
    plugin.before_request(&mut ctx).await;

    let denial = ctx.short_circuit.expect("expected denial");
    assert_eq!(denial.status, StatusCode::UNAUTHORIZED);
    assert_eq!(denial.header("WWW-Authenticate"), Some("Bearer"));
}

#[tokio::test]
async fn long_bearer_token_passes_without_auth_service() {
    let plugin = AuthenticationPlugin::new(true, false);
    let route = protected_route(vec![], None);

    let mut ctx = context_for(
        TestRequest::get()
            .uri("/app/data")
            .insert_header(("Authorization", "Bearer a-plausible-token")),
        route,
    );
    plugin.before_request(&mut ctx).await;

    assert!(ctx.short_circuit.is_none());
    assert!(ctx.authenticated);
}

#[tokio::test]
async fn short_token_is_rejected() {
    let plugin = AuthenticationPlugin::new(true, false);
    let route = protected_route(vec![], None);

    let mut ctx = context_for(
        TestRequest::get()
            .uri("/app/data")
            .insert_header(("Authorization", "Bearer short")),
        route,
    );
    plugin.before_request(&mut ctx).await;
    assert!(ctx.short_circuit.is_some());
}

#[tokio::test]
async fn cookie_token_is_accepted() {
    let plugin = AuthenticationPlugin::new(true, false);
    let route = protected_route(vec![], None);

    let mut ctx = context_for(
        TestRequest::get()
            .uri("/app/data")
            .insert_header(("Cookie", "theme=dark; access_token=cookie-borne-token")),
        route,
    );
    plugin.before_request(&mut ctx).await;
    assert!(ctx.short_circuit.is_none());
    assert!(ctx.authenticated);
}

#[tokio::test]
async fn x_auth_token_header_is_accepted() {
    let plugin = AuthenticationPlugin::new(true, false);
    let route = protected_route(vec![], None);

    let mut ctx = context_for(
        TestRequest::get()
            .uri("/app/data")
            .insert_header(("X-Auth-Token", "header-borne-token")),
        route,
    );
    plugin.before_request(&mut ctx).await;
    assert!(ctx.short_circuit.is_none());
}

#[tokio::test]
async fn disabled_plugin_is_skipped() {
    let plugin = AuthenticationPlugin::new(false, false);
    assert!(!plugin.enabled());
}

#[test]
fn redirect_builder_preserves_existing_params() {
    assert_eq!(
        build_redirect_url("/login?x=1", "/protected"),
        "/login?x=1&redirect=%2Fprotected"
    );
    assert_eq!(
        build_redirect_url("/login", "/p?q=1"),
        "/login?redirect=%2Fp%3Fq%3D1"
    );
}
