//! Tests for load balancing policies and connection tracking.

use hermes_rs::models::route::ServiceInstance;
use hermes_rs::models::settings::LoadBalanceStrategy;
use hermes_rs::services::balancer::{
    create_balancer, ConnectionTracker, LeastConnBalancer, RandomBalancer, RoundRobinBalancer,
    Balancer,
};
use std::sync::Arc;

fn instance(id: &str, healthy: bool, weight: u32) -> ServiceInstance {
    ServiceInstance {
        id: id.to_string(),
        name: "user-service".to_string(),
        host: "localhost".to_string(),
        port: 9000,
        protocol: "http".to_string(),
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        weight,
        healthy,
    }
}

#[test]
fn round_robin_cycles_through_healthy_instances() {
    let balancer = RoundRobinBalancer::new();
    let instances = vec![
        instance("user-service-1", true, 1),
        instance("user-service-2", true, 1),
        instance("user-service-3", true, 1),
    ];

    let picks: Vec<String> = (0..6)
        .map(|_| balancer.select(&instances).unwrap().id)
        .collect();

    assert_eq!(
        picks,
        vec![
            "user-service-1",
            "user-service-2",
            "user-service-3",
            "user-service-1",
            "user-service-2",
            "user-service-3",
        ]
    );
}

#[test]
fn round_robin_skips_unhealthy_instances() {
    let balancer = RoundRobinBalancer::new();
    let instances = vec![
        instance("user-service-1", false, 1),
        instance("user-service-2", true, 1),
    ];

    for _ in 0..3 {
        assert_eq!(balancer.select(&instances).unwrap().id, "user-service-2");
    }
}

#[test]
fn round_robin_keeps_independent_counters_per_service() {
    let balancer = RoundRobinBalancer::new();
    let users = vec![
        instance("user-service-1", true, 1),
        instance("user-service-2", true, 1),
    ];
    let orders = vec![
        instance("order-service-1", true, 1),
        instance("order-service-2", true, 1),
    ];

    assert_eq!(balancer.select(&users).unwrap().id, "user-service-1");
    assert_eq!(balancer.select(&orders).unwrap().id, "order-service-1");
    assert_eq!(balancer.select(&users).unwrap().id, "user-service-2");
    assert_eq!(balancer.select(&orders).unwrap().id, "order-service-2");
}

#[test]
fn random_selects_only_healthy() {
    let balancer = RandomBalancer::new();
    let instances = vec![
        instance("svc-1", false, 1),
        instance("svc-2", true, 1),
        instance("svc-3", false, 1),
    ];

    for _ in 0..20 {
        assert_eq!(balancer.select(&instances).unwrap().id, "svc-2");
    }
}

#[test]
fn least_conn_divides_by_weight() {
    let tracker = Arc::new(ConnectionTracker::new());
    let balancer = LeastConnBalancer::new(Arc::clone(&tracker));
    let instances = vec![instance("svc-1", true, 1), instance("svc-2", true, 4)];

    // svc-1: 1 connection at weight 1 -> load 1.0
    // svc-2: 2 connections at weight 4 -> load 0.5
    let _g1 = tracker.acquire("svc-1");
    let _g2 = tracker.acquire("svc-2");
    let _g3 = tracker.acquire("svc-2");

    assert_eq!(balancer.select(&instances).unwrap().id, "svc-2");
}

#[test]
fn all_balancers_return_none_on_empty_healthy_set() {
    let tracker = Arc::new(ConnectionTracker::new());
    let unhealthy = vec![instance("svc-1", false, 1)];

    for strategy in [
        LoadBalanceStrategy::RoundRobin,
        LoadBalanceStrategy::Random,
        LoadBalanceStrategy::LeastConn,
    ] {
        let balancer = create_balancer(strategy, Arc::clone(&tracker));
        assert!(balancer.select(&[]).is_none());
        assert!(balancer.select(&unhealthy).is_none());
    }
}

#[test]
fn tracker_delta_is_zero_after_guard_drop() {
    let tracker = Arc::new(ConnectionTracker::new());

    {
        let _a = tracker.acquire("svc-1");
        let _b = tracker.acquire("svc-1");
        assert_eq!(tracker.count("svc-1"), 2);
    }

    assert_eq!(tracker.count("svc-1"), 0);
}

#[test]
fn tracker_guard_releases_on_panic() {
    let tracker = Arc::new(ConnectionTracker::new());
    let tracker_clone = Arc::clone(&tracker);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let _guard = tracker_clone.acquire("svc-1");
        panic!("simulated handler panic");
    }));

    assert!(result.is_err());
    assert_eq!(tracker.count("svc-1"), 0);
}
