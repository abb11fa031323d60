//! Local route definitions from a YAML file.
//!
//! The file carries a top-level `routes:` list. Each entry names either a
//! direct `target_url` (a synthetic instance is built from it) or a
//! `target_service_id` to be resolved through the registry. Local routes
//! get negative ids and the configured priority boost so they win ties
//! against remote rules.
//!
//! ```yaml
//! routes:
//!   - path_pattern: /api/**
//!     target_url: http://localhost:9000
//!     strip_prefix: true
//!     strip_path: /api
//!     methods: "GET,POST"
//!     priority: 10
//! ```

use crate::models::error::GatewayError;
use crate::models::route::{AuthConfig, AuthServiceInfo, Route, ServiceInstance};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug, Default)]
struct LocalRoutesFile {
    #[serde(default)]
    routes: Vec<LocalRouteConfig>,
}

/// One route entry as written in the YAML file.
#[derive(Deserialize, Debug)]
pub struct LocalRouteConfig {
    pub path_pattern: String,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub target_service_id: Option<String>,
    #[serde(default = "default_methods")]
    pub methods: String,
    #[serde(default)]
    pub strip_prefix: bool,
    #[serde(default)]
    pub strip_path: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub auth_config: Option<AuthConfig>,
    #[serde(default)]
    pub auth_service: Option<AuthServiceInfo>,
}

fn default_methods() -> String {
    "*".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Loads and converts the local route file.
///
/// A missing file is not an error; it simply yields no routes. Individual
/// entries that fail conversion are logged and skipped so one bad rule
/// cannot take down the rest of the file.
pub fn load_local_routes(path: &Path, priority_boost: i32) -> Result<Vec<Route>, GatewayError> {
    if !path.exists() {
        log::debug!("Local routes file not found: {}", path.display());
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path).map_err(|e| GatewayError::LocalRoutes {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    let file: LocalRoutesFile =
        serde_yaml::from_str(&raw).map_err(|e| GatewayError::LocalRoutes {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })?;

    let mut routes = Vec::with_capacity(file.routes.len());
    for (index, config) in file.routes.into_iter().enumerate() {
        // Local routes use negative ids
        let route_id = -((index as i64) + 1);

        match route_from_config(config, route_id, priority_boost) {
            Ok(route) => routes.push(route),
            Err(e) => log::warn!("Skipping invalid local route #{}: {}", index + 1, e),
        }
    }

    log::info!("Loaded {} local routes from {}", routes.len(), path.display());
    Ok(routes)
}

fn route_from_config(
    config: LocalRouteConfig,
    route_id: i64,
    priority_boost: i32,
) -> Result<Route, String> {
    let (target_service_id, target_service) = match config.target_url.as_deref() {
        Some(target_url) => {
            let parsed = url::Url::parse(target_url)
                .map_err(|e| format!("Invalid target_url {}: {}", target_url, e))?;

            let host = parsed
                .host_str()
                .ok_or_else(|| format!("target_url has no host: {}", target_url))?
                .to_string();
            let protocol = parsed.scheme().to_string();
            let port = parsed
                .port_or_known_default()
                .ok_or_else(|| format!("target_url has no port: {}", target_url))?;

            let id = format!("local-{}-{}", host, port);
            let instance = ServiceInstance {
                id: id.clone(),
                name: format!("Local: {}", target_url),
                host,
                port,
                protocol,
                status: "healthy".to_string(),
                weight: 1,
                healthy: true,
            };

            (id, instance)
        }
        None => {
            let service_id = config
                .target_service_id
                .clone()
                .filter(|s| !s.is_empty())
                .ok_or("Either target_url or target_service_id is required")?;

            // Unhealthy placeholder until the registry resolves the service
            let instance = ServiceInstance {
                id: service_id.clone(),
                name: service_id.clone(),
                host: String::new(),
                port: 0,
                protocol: "http".to_string(),
                status: "unknown".to_string(),
                weight: 1,
                healthy: false,
            };

            (service_id, instance)
        }
    };

    let route = Route {
        id: route_id,
        path_pattern: config.path_pattern,
        methods: config.methods,
        target_service_id,
        target_service,
        strip_prefix: config.strip_prefix,
        strip_path: config.strip_path,
        priority: config.priority + priority_boost,
        enabled: config.enabled,
        auth_config: config.auth_config,
        auth_service: config.auth_service,
        is_local: true,
    };

    route.validate()?;
    Ok(route)
}
