//! Load balancing across upstream service instances.
//!
//! Three policies are available, selected process-wide at startup:
//! round-robin, random, and least-connections. All policies see only
//! healthy instances; an empty healthy set yields `None` and the caller
//! answers 503.

use crate::models::route::ServiceInstance;
use crate::models::settings::LoadBalanceStrategy;
use ahash::HashMap as AHashMap;
use std::sync::{Arc, Mutex};

/// A load balancer selects one instance out of a candidate set.
///
/// Implementations filter for `healthy` first and return `None` when
/// nothing survives the filter. Selection must not perform I/O and must
/// not hold locks beyond its own counter update.
pub trait Balancer: Send + Sync {
    /// Picks an instance, or `None` when no healthy instance exists.
    fn select(&self, instances: &[ServiceInstance]) -> Option<ServiceInstance>;
}

/// Extracts the service-id prefix of an instance id.
///
/// Instance ids follow `service-name-N`; everything before the last `-`
/// identifies the service. Ids without a dash are their own key.
fn service_key(instance_id: &str) -> &str {
    match instance_id.rfind('-') {
        Some(idx) => &instance_id[..idx],
        None => instance_id,
    }
}

/// Round-robin balancer.
///
/// Keeps one counter per service key; the counter read and increment happen
/// in a single critical section so concurrent selections never observe the
/// same position.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    counters: Mutex<AHashMap<String, u64>>,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(AHashMap::default()),
        }
    }
}

impl Balancer for RoundRobinBalancer {
    fn select(&self, instances: &[ServiceInstance]) -> Option<ServiceInstance> {
        let healthy: Vec<&ServiceInstance> = instances.iter().filter(|i| i.healthy).collect();
        if healthy.is_empty() {
            return None;
        }

        let key = service_key(&healthy[0].id).to_string();

        let mut counters = self.counters.lock().unwrap();
        let counter = counters.entry(key).or_insert(0);
        let selected = healthy[(*counter as usize) % healthy.len()].clone();
        *counter += 1;

        Some(selected)
    }
}

/// Random balancer. Uniform over the healthy set, no state.
#[derive(Debug, Default)]
pub struct RandomBalancer;

impl RandomBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl Balancer for RandomBalancer {
    fn select(&self, instances: &[ServiceInstance]) -> Option<ServiceInstance> {
        use rand::seq::SliceRandom;

        let healthy: Vec<&ServiceInstance> = instances.iter().filter(|i| i.healthy).collect();
        let mut rng = rand::thread_rng();
        healthy.choose(&mut rng).map(|i| (*i).clone())
    }
}

/// Least-connections balancer.
///
/// Selects the healthy instance minimizing
/// `active_connections / max(weight, 1)`; ties go to the earlier instance
/// in iteration order. Connection counts come from the shared
/// [`ConnectionTracker`], never from the instance value itself.
pub struct LeastConnBalancer {
    tracker: Arc<ConnectionTracker>,
}

impl LeastConnBalancer {
    pub fn new(tracker: Arc<ConnectionTracker>) -> Self {
        Self { tracker }
    }
}

impl Balancer for LeastConnBalancer {
    fn select(&self, instances: &[ServiceInstance]) -> Option<ServiceInstance> {
        let healthy: Vec<&ServiceInstance> = instances.iter().filter(|i| i.healthy).collect();
        if healthy.is_empty() {
            return None;
        }

        let mut best: Option<(&ServiceInstance, f64)> = None;
        for instance in healthy {
            let connections = self.tracker.count(&instance.id) as f64;
            let load = connections / f64::from(instance.weight.max(1));

            match best {
                Some((_, best_load)) if load >= best_load => {}
                _ => best = Some((instance, load)),
            }
        }

        best.map(|(instance, _)| instance.clone())
    }
}

/// Creates the process-wide balancer for the configured strategy.
pub fn create_balancer(
    strategy: LoadBalanceStrategy,
    tracker: Arc<ConnectionTracker>,
) -> Arc<dyn Balancer> {
    match strategy {
        LoadBalanceStrategy::RoundRobin => Arc::new(RoundRobinBalancer::new()),
        LoadBalanceStrategy::Random => Arc::new(RandomBalancer::new()),
        LoadBalanceStrategy::LeastConn => Arc::new(LeastConnBalancer::new(tracker)),
    }
}

/// Active-connection counts keyed by instance id.
///
/// The tracker is the single owner of per-instance connection state. The
/// orchestrator acquires before forwarding and the returned guard releases
/// on drop, so the count returns to its prior value on every exit path,
/// panics included. Release saturates at zero.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    counts: Mutex<AHashMap<String, u64>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(AHashMap::default()),
        }
    }

    /// Increments the count for an instance and returns a release guard.
    pub fn acquire(&self, instance_id: &str) -> ConnectionGuard<'_> {
        {
            let mut counts = self.counts.lock().unwrap();
            *counts.entry(instance_id.to_string()).or_insert(0) += 1;
        }

        ConnectionGuard {
            tracker: self,
            instance_id: instance_id.to_string(),
        }
    }

    /// Current count for an instance; zero when untracked.
    pub fn count(&self, instance_id: &str) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .get(instance_id)
            .copied()
            .unwrap_or(0)
    }

    fn release(&self, instance_id: &str) {
        let mut counts = self.counts.lock().unwrap();
        if let Some(count) = counts.get_mut(instance_id) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Decrements the tracked count when dropped.
pub struct ConnectionGuard<'a> {
    tracker: &'a ConnectionTracker,
    instance_id: String,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.tracker.release(&self.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, healthy: bool, weight: u32) -> ServiceInstance {
        ServiceInstance {
            id: id.to_string(),
            name: "svc".to_string(),
            host: "localhost".to_string(),
            port: 9000,
            protocol: "http".to_string(),
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            weight,
            healthy,
        }
    }

    #[test]
    fn guard_restores_count_on_drop() {
        let tracker = Arc::new(ConnectionTracker::new());
        {
            let _guard = tracker.acquire("svc-1");
            assert_eq!(tracker.count("svc-1"), 1);
        }
        assert_eq!(tracker.count("svc-1"), 0);
    }

    #[test]
    fn release_never_goes_negative() {
        let tracker = ConnectionTracker::new();
        tracker.release("svc-1");
        assert_eq!(tracker.count("svc-1"), 0);
    }

    #[test]
    fn service_key_drops_instance_suffix() {
        assert_eq!(service_key("user-service-1"), "user-service");
        assert_eq!(service_key("standalone"), "standalone");
    }

    #[test]
    fn least_conn_prefers_weighted_idle_instance() {
        let tracker = Arc::new(ConnectionTracker::new());
        let balancer = LeastConnBalancer::new(Arc::clone(&tracker));

        let instances = vec![
            instance("svc-1", true, 1),
            instance("svc-2", true, 2),
        ];

        let _a = tracker.acquire("svc-1");
        let _b = tracker.acquire("svc-2");
        let _c = tracker.acquire("svc-2");

        // svc-1 load 1/1, svc-2 load 2/2 -> tie broken by order
        let selected = balancer.select(&instances).unwrap();
        assert_eq!(selected.id, "svc-1");
    }
}
