//! The route table: merged view of remote and local routing rules.
//!
//! Remote routes come from the registry, local routes from the YAML file.
//! Updates replace a whole collection; readers take an `Arc` snapshot of
//! the merged, priority-ordered list and never observe a partial update.
//! A failed remote refresh keeps the last-known good remote set.

use crate::config::local_routes::load_local_routes;
use crate::models::error::GatewayError;
use crate::models::route::{RemoteRoute, Route};
use crate::models::settings::Settings;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Copy-on-write route collections.
///
/// `get_routes` is the hot path: it clones one `Arc` under a read lock and
/// returns a snapshot sorted by priority descending, local routes ahead of
/// same-priority remote ones (their boosted priority guarantees it).
pub struct RouteTable {
    registry_url: String,
    gateway_id: String,
    local_routes_file: PathBuf,
    priority_boost: i32,
    client: reqwest::Client,
    remote_routes: RwLock<Arc<Vec<Arc<Route>>>>,
    local_routes: RwLock<Arc<Vec<Arc<Route>>>>,
    merged: RwLock<Arc<Vec<Arc<Route>>>>,
    registry_available: AtomicBool,
}

impl RouteTable {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create registry HTTP client");

        Self {
            registry_url: settings.registry_url.trim_end_matches('/').to_string(),
            gateway_id: settings.service_id.clone(),
            local_routes_file: PathBuf::from(&settings.local_routes_file),
            priority_boost: settings.local_routes_priority_boost,
            client,
            remote_routes: RwLock::new(Arc::new(Vec::new())),
            local_routes: RwLock::new(Arc::new(Vec::new())),
            merged: RwLock::new(Arc::new(Vec::new())),
            registry_available: AtomicBool::new(false),
        }
    }

    /// Snapshot of the current merged route list.
    pub fn get_routes(&self) -> Arc<Vec<Arc<Route>>> {
        Arc::clone(&self.merged.read().unwrap())
    }

    pub fn route_count(&self) -> usize {
        self.merged.read().unwrap().len()
    }

    /// Whether the last remote refresh succeeded.
    pub fn registry_available(&self) -> bool {
        self.registry_available.load(Ordering::Relaxed)
    }

    /// Replaces the remote collection wholesale.
    pub fn set_remote_routes(&self, routes: Vec<Route>) {
        let routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        *self.remote_routes.write().unwrap() = Arc::new(routes);
        self.rebuild();
    }

    /// Replaces the local collection wholesale.
    pub fn set_local_routes(&self, routes: Vec<Route>) {
        let routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        *self.local_routes.write().unwrap() = Arc::new(routes);
        self.rebuild();
    }

    /// Re-parses the local routes file and replaces the local collection.
    pub fn reload_local(&self) -> Result<usize, GatewayError> {
        let routes = load_local_routes(&self.local_routes_file, self.priority_boost)?;
        let count = routes.len();
        self.set_local_routes(routes);
        Ok(count)
    }

    /// Fetches the remote route set from the registry.
    ///
    /// On success the remote collection is replaced; on any failure the
    /// last-known set stays in place and the registry is marked
    /// unavailable. Returns whether the refresh succeeded.
    pub async fn refresh_remote(&self) -> bool {
        let url = format!("{}/api/v1/gateway/routes", self.registry_url);

        let response = self
            .client
            .get(&url)
            .header("X-Gateway-ID", &self.gateway_id)
            .send()
            .await;

        match response {
            Ok(response) if response.status().as_u16() == 200 => {
                match response.json::<Vec<RemoteRoute>>().await {
                    Ok(remote) => {
                        let routes: Vec<Route> = remote.into_iter().map(Route::from).collect();
                        log::debug!("Refreshed {} remote routes", routes.len());
                        self.set_remote_routes(routes);
                        self.registry_available.store(true, Ordering::Relaxed);
                        return true;
                    }
                    Err(e) => {
                        log::warn!("Malformed route payload from registry: {}", e);
                    }
                }
            }
            Ok(response) if response.status().as_u16() == 403 => {
                log::warn!(
                    "Registry denied route access (gateway {} not marked as gateway)",
                    self.gateway_id
                );
            }
            Ok(response) if response.status().as_u16() == 404 => {
                log::warn!("Gateway {} not found in registry", self.gateway_id);
            }
            Ok(response) => {
                log::warn!("Route refresh failed: HTTP {}", response.status());
            }
            Err(e) => {
                log::warn!("Route refresh request error: {}", e);
            }
        }

        self.registry_available.store(false, Ordering::Relaxed);
        false
    }

    /// Rebuilds the merged snapshot: local then remote, stable-sorted by
    /// priority descending.
    fn rebuild(&self) {
        let local = Arc::clone(&self.local_routes.read().unwrap());
        let remote = Arc::clone(&self.remote_routes.read().unwrap());

        let mut merged: Vec<Arc<Route>> = Vec::with_capacity(local.len() + remote.len());
        merged.extend(local.iter().cloned());
        merged.extend(remote.iter().cloned());
        merged.sort_by_key(|route| std::cmp::Reverse(route.priority));

        *self.merged.write().unwrap() = Arc::new(merged);
    }
}

/// Spawns the periodic remote refresh task.
///
/// Errors are logged inside `refresh_remote`; the loop only ends when the
/// shutdown channel flips.
pub fn spawn_refresh_task(
    table: Arc<RouteTable>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it, initial load already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    table.refresh_remote().await;
                }
                _ = shutdown.changed() => {
                    log::info!("Route refresh task stopping");
                    break;
                }
            }
        }
    })
}
