use serde::{Deserialize, Serialize};

/// One endpoint of an upstream service.
///
/// Instances are produced by the registry payload or synthesized from a local
/// `target_url`, and live exactly as long as the route that embeds them.
/// Equality follows the stable `id`, which is also the key every piece of
/// per-instance state (connection counts, circuit breakers) is tracked under.
///
/// # Examples
///
/// ```json
/// {
///   "id": "user-service-1",
///   "name": "user-service",
///   "host": "10.0.3.17",
///   "port": 9000,
///   "protocol": "http",
///   "status": "healthy",
///   "weight": 2
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServiceInstance {
    /// Stable instance identifier.
    pub id: String,

    /// Human-readable service name.
    pub name: String,

    /// Host address (no scheme).
    pub host: String,

    /// Port number.
    pub port: u16,

    /// Transport protocol, `http` or `https`.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Registry-reported status string (`healthy`/`unhealthy`/`unknown`).
    #[serde(default = "default_status")]
    pub status: String,

    /// Weight for load balancing (>= 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Whether the instance is eligible to receive traffic.
    #[serde(default = "default_healthy")]
    pub healthy: bool,
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_status() -> String {
    "unknown".to_string()
}

fn default_weight() -> u32 {
    1
}

fn default_healthy() -> bool {
    true
}

impl ServiceInstance {
    /// Base URL of the instance, `protocol://host:port`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    /// Validates instance fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Instance id must not be empty".to_string());
        }

        if self.protocol != "http" && self.protocol != "https" {
            return Err(format!("Unsupported protocol: {}", self.protocol));
        }

        if self.weight == 0 {
            return Err("Instance weight must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl PartialEq for ServiceInstance {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceInstance {}

/// Reference to an external authentication service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthServiceInfo {
    /// Service id of the auth provider.
    #[serde(default)]
    pub id: String,

    /// Service name of the auth provider.
    #[serde(default)]
    pub name: String,

    /// Base URL the token validation endpoint hangs off of.
    #[serde(default)]
    pub base_url: String,
}

/// Per-route authentication requirements.
///
/// Attached to a route by the registry or the local route file. When
/// `require_auth` is false (or the whole config is absent) the route is
/// public.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AuthConfig {
    /// Whether requests on this route must carry a valid token.
    #[serde(default)]
    pub require_auth: bool,

    /// Path patterns exempt from authentication.
    /// Same grammar as route patterns (`*`, `**`, `{name}`).
    #[serde(default)]
    pub public_paths: Vec<String>,

    /// URL browser clients are redirected to when unauthenticated.
    #[serde(default)]
    pub login_redirect: Option<String>,
}

/// One routing rule binding a path pattern to an upstream service.
///
/// Routes come from two sources: the registry (`is_local = false`, positive
/// ids) and the local YAML file (`is_local = true`, negative ids, priority
/// boosted so local rules win ties). A refresh replaces the whole collection;
/// individual routes are never mutated in place.
///
/// # Pattern grammar
///
/// - literal segments match exactly
/// - `*` matches within one segment
/// - `**` matches across segments (an empty tail included)
/// - `{name}` matches one non-empty segment
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Route {
    /// Route id. Negative for routes loaded from the local file.
    pub id: i64,

    /// Path pattern the request path is matched against.
    pub path_pattern: String,

    /// Allowed HTTP methods, comma-separated uppercase tokens, or `*`.
    #[serde(default = "default_methods")]
    pub methods: String,

    /// Id of the upstream service this route forwards to.
    pub target_service_id: String,

    /// The upstream instance embedded in this route.
    pub target_service: ServiceInstance,

    /// Whether `strip_path` is removed from the path before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,

    /// Path prefix to strip. Required when `strip_prefix` is set.
    #[serde(default)]
    pub strip_path: Option<String>,

    /// Priority; higher wins. Local routes carry the configured boost.
    #[serde(default)]
    pub priority: i32,

    /// Disabled routes are skipped by the matcher.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Authentication requirements, if any.
    #[serde(default)]
    pub auth_config: Option<AuthConfig>,

    /// Auth service to validate tokens against, if any.
    #[serde(default)]
    pub auth_service: Option<AuthServiceInfo>,

    /// Whether this route was loaded from the local file.
    #[serde(default)]
    pub is_local: bool,
}

fn default_methods() -> String {
    "*".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Route {
    /// Validates the route definition.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first violation:
    /// - pattern not starting with `/`
    /// - `strip_prefix` set without a non-empty `strip_path`
    /// - embedded instance failing its own validation
    pub fn validate(&self) -> Result<(), String> {
        if !self.path_pattern.starts_with('/') {
            return Err(format!(
                "Path pattern must start with '/': {}",
                self.path_pattern
            ));
        }

        if self.strip_prefix {
            match &self.strip_path {
                Some(p) if !p.is_empty() => {}
                _ => {
                    return Err(format!(
                        "strip_prefix requires a non-empty strip_path: {}",
                        self.path_pattern
                    ))
                }
            }
        }

        self.target_service.validate()?;

        Ok(())
    }
}

/// Wire shape of a route as returned by `GET /api/v1/gateway/routes`.
///
/// Kept separate from [`Route`] so registry payload quirks (missing fields,
/// status-derived health) stay at the deserialization edge.
#[derive(Deserialize, Debug)]
pub struct RemoteRoute {
    pub id: i64,
    pub path_pattern: String,
    pub target_service_id: String,
    #[serde(default)]
    pub target_service: Option<RemoteInstance>,
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

/// Wire shape of an embedded instance in a registry route payload.
#[derive(Deserialize, Debug, Default)]
pub struct RemoteInstance {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl From<RemoteRoute> for Route {
    fn from(remote: RemoteRoute) -> Self {
        let target = remote.target_service.unwrap_or_default();
        let healthy = target.status == "healthy";

        Route {
            id: remote.id,
            path_pattern: remote.path_pattern,
            methods: remote.methods,
            target_service_id: remote.target_service_id,
            target_service: ServiceInstance {
                id: target.id,
                name: target.name,
                host: target.host,
                port: target.port,
                protocol: target.protocol,
                status: target.status,
                weight: target.weight,
                healthy,
            },
            strip_prefix: remote.strip_prefix,
            strip_path: remote.strip_path,
            priority: remote.priority,
            enabled: remote.enabled,
            auth_config: remote.auth_config,
            auth_service: remote.auth_service,
            is_local: false,
        }
    }
}
