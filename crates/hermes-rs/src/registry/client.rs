//! Service registry client: registration, heartbeat, deregistration.
//!
//! The gateway registers itself with `is_gateway: true` so the registry
//! hands back routing rules, keeps a fixed-interval heartbeat running, and
//! deregisters best-effort on shutdown. Registry unavailability never
//! affects request handling; it is logged and retried on the next tick.

use crate::models::error::GatewayError;
use crate::models::settings::Settings;
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;

/// Registry API client.
#[derive(Clone)]
pub struct RegistryClient {
    registry_url: String,
    service_id: String,
    service_name: String,
    host: String,
    port: u16,
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create registry HTTP client");

        Self {
            registry_url: settings.registry_url.trim_end_matches('/').to_string(),
            service_id: settings.service_id.clone(),
            service_name: settings.service_name.clone(),
            host: settings.service_host.clone(),
            port: settings.port,
            client,
        }
    }

    /// Registers this gateway with the registry.
    ///
    /// A 409 means the service already exists; registration is then
    /// retried as an update via `PUT` on the same resource.
    pub async fn register(&self) -> Result<(), GatewayError> {
        let payload = json!({
            "id": self.service_id,
            "name": self.service_name,
            "host": self.host,
            "port": self.port,
            "protocol": "http",
            "health_check_path": "/health",
            "is_gateway": true,
            "service_meta": {
                "type": "api_gateway",
                "version": env!("CARGO_PKG_VERSION"),
                "features": [
                    "routing",
                    "load_balancing",
                    "rate_limiting",
                    "circuit_breaker",
                ],
            },
        });

        let url = format!("{}/api/v1/services", self.registry_url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Registry {
                message: format!("Registration request failed: {}", e),
            })?;

        match response.status().as_u16() {
            200 | 201 => {
                log::debug!("Registered service {}", self.service_id);
                Ok(())
            }
            409 => {
                log::debug!("Service {} already registered, updating", self.service_id);
                let update_url = format!("{}/api/v1/services/{}", self.registry_url, self.service_id);
                let update = self
                    .client
                    .put(&update_url)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| GatewayError::Registry {
                        message: format!("Registration update failed: {}", e),
                    })?;

                if update.status().as_u16() == 200 {
                    Ok(())
                } else {
                    Err(GatewayError::Registry {
                        message: format!("Registration update answered HTTP {}", update.status()),
                    })
                }
            }
            status => Err(GatewayError::Registry {
                message: format!("Registration answered HTTP {}", status),
            }),
        }
    }

    /// Deregisters on shutdown. Best effort; failures are logged only.
    pub async fn deregister(&self) {
        let url = format!("{}/api/v1/services/{}", self.registry_url, self.service_id);
        match self.client.delete(&url).send().await {
            Ok(_) => log::debug!("Deregistered service {}", self.service_id),
            Err(e) => log::debug!("Deregistration failed (ignored): {}", e),
        }
    }

    /// Sends one heartbeat.
    pub async fn send_heartbeat(&self) {
        let url = format!(
            "{}/api/v1/services/{}/heartbeat",
            self.registry_url, self.service_id
        );

        match self.client.post(&url).send().await {
            Ok(response) if response.status().as_u16() == 200 => {
                log::debug!("Heartbeat sent for {}", self.service_id);
            }
            Ok(response) => {
                log::warn!("Heartbeat answered HTTP {}", response.status());
            }
            Err(e) => {
                log::debug!("Heartbeat failed: {}", e);
            }
        }
    }
}

/// Spawns the fixed-interval heartbeat task.
pub fn spawn_heartbeat_task(
    client: RegistryClient,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    client.send_heartbeat().await;
                }
                _ = shutdown.changed() => {
                    log::info!("Heartbeat task stopping");
                    break;
                }
            }
        }
    })
}
