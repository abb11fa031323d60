//! Tests for route pattern matching and method validation.

use hermes_rs::models::route::{Route, ServiceInstance};
use hermes_rs::utils::route_matcher::{match_method, RouteMatcher};
use std::sync::Arc;

fn route(id: i64, pattern: &str, methods: &str, priority: i32, enabled: bool) -> Arc<Route> {
    Arc::new(Route {
        id,
        path_pattern: pattern.to_string(),
        methods: methods.to_string(),
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
        priority,
        enabled,
        auth_config: None,
        auth_service: None,
        is_local: false,
    })
}

#[test]
fn exact_pattern_matches_literally() {
    let matcher = RouteMatcher::new();
    assert!(matcher.match_path("/api/v1/users", "/api/v1/users"));
    assert!(!matcher.match_path("/api/v1/users", "/api/v1/users/1"));
    assert!(!matcher.match_path("/api/v1/users", "/api/v1"));
}

#[test]
fn single_star_matches_one_segment() {
    let matcher = RouteMatcher::new();
    assert!(matcher.match_path("/api/v1/*", "/api/v1/a"));
    assert!(!matcher.match_path("/api/v1/*", "/api/v1/a/b"));
}

#[test]
fn double_star_matches_across_segments() {
    let matcher = RouteMatcher::new();
    assert!(matcher.match_path("/api/v1/**", "/api/v1/a/b"));
    assert!(matcher.match_path("/api/v1/**", "/api/v1/a"));
}

#[test]
fn trailing_double_star_matches_empty_tail() {
    let matcher = RouteMatcher::new();
    assert!(matcher.match_path("/api/**", "/api"));
    assert!(matcher.match_path("/api/**", "/api/a/b"));
}

#[test]
fn interior_double_star_spans_segments() {
    let matcher = RouteMatcher::new();
    assert!(matcher.match_path("/a/**/z", "/a/b/c/z"));
    assert!(!matcher.match_path("/a/**/z", "/a/b/c"));
}

#[test]
fn path_param_matches_single_segment() {
    let matcher = RouteMatcher::new();
    assert!(matcher.match_path("/users/{id}", "/users/42"));
    assert!(!matcher.match_path("/users/{id}", "/users/42/posts"));
    assert!(!matcher.match_path("/users/{id}", "/users/"));
}

#[test]
fn mixed_star_and_double_star() {
    let matcher = RouteMatcher::new();
    // ** must not be consumed by the single-star rule
    assert!(matcher.match_path("/a/*/b/**", "/a/x/b"));
    assert!(matcher.match_path("/a/*/b/**", "/a/x/b/c/d"));
    assert!(!matcher.match_path("/a/*/b/**", "/a/x/y/b"));
}

#[test]
fn regex_metacharacters_are_literal() {
    let matcher = RouteMatcher::new();
    assert!(matcher.match_path("/api/v1.0/users", "/api/v1.0/users"));
    assert!(!matcher.match_path("/api/v1.0/users", "/api/v1x0/users"));
}

#[test]
fn method_wildcard_accepts_everything() {
    assert!(match_method("*", "GET"));
    assert!(match_method("*", "DELETE"));
}

#[test]
fn method_list_is_case_insensitive_on_request() {
    assert!(match_method("GET,POST", "get"));
    assert!(match_method("GET, POST", "POST"));
    assert!(!match_method("GET,POST", "DELETE"));
}

#[test]
fn find_match_returns_first_in_order() {
    let matcher = RouteMatcher::new();
    let routes = vec![
        route(1, "/api/**", "*", 100, true),
        route(2, "/api/v1/users", "*", 50, true),
    ];

    let matched = matcher.find_match(&routes, "GET", "/api/v1/users").unwrap();
    assert_eq!(matched.id, 1);
}

#[test]
fn find_match_skips_disabled_routes() {
    let matcher = RouteMatcher::new();
    let routes = vec![
        route(1, "/api/**", "*", 100, false),
        route(2, "/api/v1/users", "*", 50, true),
    ];

    let matched = matcher.find_match(&routes, "GET", "/api/v1/users").unwrap();
    assert_eq!(matched.id, 2);
}

#[test]
fn find_match_honors_method_lists() {
    let matcher = RouteMatcher::new();
    let routes = vec![
        route(1, "/api/**", "POST", 100, true),
        route(2, "/api/**", "GET", 50, true),
    ];

    let matched = matcher.find_match(&routes, "GET", "/api/x").unwrap();
    assert_eq!(matched.id, 2);

    assert!(matcher.find_match(&routes, "DELETE", "/api/x").is_none());
}

#[test]
fn find_match_returns_none_without_candidates() {
    let matcher = RouteMatcher::new();
    let routes = vec![route(1, "/api/**", "*", 0, true)];
    assert!(matcher.find_match(&routes, "GET", "/other").is_none());
}
