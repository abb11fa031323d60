use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Load balancing strategy for distributing requests across instances.
///
/// The strategy is a single process-wide choice made at startup from
/// `HERMES_LOAD_BALANCE_STRATEGY`.
///
/// # Strategies
///
/// - **RoundRobin**: cycles through healthy instances per service (default)
/// - **Random**: uniform pick over healthy instances
/// - **LeastConn**: fewest active connections, weight-adjusted
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    RoundRobin,
    Random,
    LeastConn,
}

impl Default for LoadBalanceStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

impl FromStr for LoadBalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "round_robin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            "least_conn" => Ok(Self::LeastConn),
            other => Err(format!("Unknown load balance strategy: {}", other)),
        }
    }
}

/// Immutable gateway configuration, read once at startup.
///
/// Every field is backed by an environment variable with the `HERMES_`
/// prefix and falls back to the documented default. The value is threaded
/// through constructors; nothing reads the environment after
/// [`Settings::from_env`] returns.
///
/// # Examples
///
/// ```bash
/// HERMES_PORT=8880 \
/// HERMES_REGISTRY_URL=http://localhost:8888 \
/// HERMES_LOAD_BALANCE_STRATEGY=least_conn \
/// hermes-gateway
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind address for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,

    /// Whether to register with the service registry and pull remote routes.
    pub registry_enabled: bool,
    /// Base URL of the service registry.
    pub registry_url: String,
    /// This gateway's service id in the registry.
    pub service_id: String,
    /// This gateway's display name in the registry.
    pub service_name: String,
    /// Externally reachable host advertised on registration.
    pub service_host: String,
    /// Heartbeat interval.
    pub heartbeat_interval: Duration,
    /// Remote route refresh interval.
    pub route_refresh_interval: Duration,

    /// Upstream request timeout.
    pub proxy_timeout: Duration,
    /// Maximum retries after a transport error.
    pub proxy_max_retries: u32,
    /// Delay between retries.
    pub proxy_retry_delay: Duration,

    /// Process-wide load balancing strategy.
    pub load_balance_strategy: LoadBalanceStrategy,

    /// Whether the rate limit plugin is active.
    pub rate_limit_enabled: bool,
    /// Global refill rate, tokens per second.
    pub rate_limit_global_qps: f64,
    /// Per-route refill rate, tokens per second.
    pub rate_limit_per_route_qps: f64,
    /// Per-client-IP refill rate, tokens per second.
    pub rate_limit_per_ip_qps: f64,
    /// Bucket capacity multiplier over the refill rate.
    pub rate_limit_burst_multiplier: f64,

    /// Whether the circuit breaker plugin is active.
    pub circuit_breaker_enabled: bool,
    /// Consecutive failures that trip a breaker.
    pub circuit_breaker_failure_threshold: u32,
    /// Half-open successes that close a breaker.
    pub circuit_breaker_success_threshold: u32,
    /// Cool-down before an open breaker admits a probe.
    pub circuit_breaker_timeout: Duration,

    /// Path of the local routes YAML file.
    pub local_routes_file: String,
    /// Priority added to every local route so local wins ties.
    pub local_routes_priority_boost: i32,

    /// Whether the authentication plugin is active.
    pub auth_plugin_enabled: bool,
    /// Admit requests when the auth service is unreachable.
    pub auth_degrade_allow: bool,

    /// Emit JSON log lines instead of aligned text.
    pub log_json_format: bool,
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_secs(key: &str, default: f64) -> Duration {
    Duration::from_secs_f64(env_parse(key, default).max(0.0))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8880,
            registry_enabled: true,
            registry_url: "http://localhost:8888".to_string(),
            service_id: "hermes".to_string(),
            service_name: "Hermes API Gateway".to_string(),
            service_host: "127.0.0.1".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            route_refresh_interval: Duration::from_secs(30),
            proxy_timeout: Duration::from_secs(30),
            proxy_max_retries: 3,
            proxy_retry_delay: Duration::from_millis(500),
            load_balance_strategy: LoadBalanceStrategy::RoundRobin,
            rate_limit_enabled: true,
            rate_limit_global_qps: 10_000.0,
            rate_limit_per_route_qps: 1_000.0,
            rate_limit_per_ip_qps: 100.0,
            rate_limit_burst_multiplier: 1.5,
            circuit_breaker_enabled: true,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_success_threshold: 2,
            circuit_breaker_timeout: Duration::from_secs(30),
            local_routes_file: "routes.yaml".to_string(),
            local_routes_priority_boost: 1000,
            auth_plugin_enabled: true,
            auth_degrade_allow: false,
            log_json_format: true,
        }
    }
}

impl Settings {
    /// Reads the full configuration from `HERMES_*` environment variables.
    ///
    /// Unset or unparseable variables fall back to defaults; this never
    /// fails. Call once during bootstrap and pass the value down.
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        Settings {
            host: env_string("HERMES_HOST", &defaults.host),
            port: env_parse("HERMES_PORT", defaults.port),
            registry_enabled: env_bool("HERMES_REGISTRY_ENABLED", defaults.registry_enabled),
            registry_url: env_string("HERMES_REGISTRY_URL", &defaults.registry_url),
            service_id: env_string("HERMES_SERVICE_ID", &defaults.service_id),
            service_name: env_string("HERMES_SERVICE_NAME", &defaults.service_name),
            service_host: env_string("HERMES_SERVICE_HOST", &defaults.service_host),
            heartbeat_interval: env_secs("HERMES_HEARTBEAT_INTERVAL", 30.0),
            route_refresh_interval: env_secs("HERMES_ROUTE_REFRESH_INTERVAL", 30.0),
            proxy_timeout: env_secs("HERMES_PROXY_TIMEOUT", 30.0),
            proxy_max_retries: env_parse("HERMES_PROXY_MAX_RETRIES", defaults.proxy_max_retries),
            proxy_retry_delay: env_secs("HERMES_PROXY_RETRY_DELAY", 0.5),
            load_balance_strategy: env_parse(
                "HERMES_LOAD_BALANCE_STRATEGY",
                defaults.load_balance_strategy,
            ),
            rate_limit_enabled: env_bool("HERMES_RATE_LIMIT_ENABLED", defaults.rate_limit_enabled),
            rate_limit_global_qps: env_parse(
                "HERMES_RATE_LIMIT_GLOBAL_QPS",
                defaults.rate_limit_global_qps,
            ),
            rate_limit_per_route_qps: env_parse(
                "HERMES_RATE_LIMIT_PER_ROUTE_QPS",
                defaults.rate_limit_per_route_qps,
            ),
            rate_limit_per_ip_qps: env_parse(
                "HERMES_RATE_LIMIT_PER_IP_QPS",
                defaults.rate_limit_per_ip_qps,
            ),
            rate_limit_burst_multiplier: env_parse(
                "HERMES_RATE_LIMIT_BURST_MULTIPLIER",
                defaults.rate_limit_burst_multiplier,
            ),
            circuit_breaker_enabled: env_bool(
                "HERMES_CIRCUIT_BREAKER_ENABLED",
                defaults.circuit_breaker_enabled,
            ),
            circuit_breaker_failure_threshold: env_parse(
                "HERMES_CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                defaults.circuit_breaker_failure_threshold,
            ),
            circuit_breaker_success_threshold: env_parse(
                "HERMES_CIRCUIT_BREAKER_SUCCESS_THRESHOLD",
                defaults.circuit_breaker_success_threshold,
            ),
            circuit_breaker_timeout: env_secs("HERMES_CIRCUIT_BREAKER_TIMEOUT", 30.0),
            local_routes_file: env_string("HERMES_LOCAL_ROUTES_FILE", &defaults.local_routes_file),
            local_routes_priority_boost: env_parse(
                "HERMES_LOCAL_ROUTES_PRIORITY_BOOST",
                defaults.local_routes_priority_boost,
            ),
            auth_plugin_enabled: env_bool(
                "HERMES_AUTH_PLUGIN_ENABLED",
                defaults.auth_plugin_enabled,
            ),
            auth_degrade_allow: env_bool("HERMES_AUTH_DEGRADE_ALLOW", defaults.auth_degrade_allow),
            log_json_format: env_bool("HERMES_LOG_JSON", defaults.log_json_format),
        }
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port must be between 1 and 65535".to_string());
        }

        if self.rate_limit_burst_multiplier < 1.0 {
            return Err("Burst multiplier must be >= 1.0".to_string());
        }

        if self.circuit_breaker_failure_threshold == 0 {
            return Err("Circuit breaker failure threshold must be > 0".to_string());
        }

        if self.circuit_breaker_success_threshold == 0 {
            return Err("Circuit breaker success threshold must be > 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_known_names() {
        assert_eq!(
            "round_robin".parse::<LoadBalanceStrategy>().unwrap(),
            LoadBalanceStrategy::RoundRobin
        );
        assert_eq!(
            "least_conn".parse::<LoadBalanceStrategy>().unwrap(),
            LoadBalanceStrategy::LeastConn
        );
        assert!("weighted".parse::<LoadBalanceStrategy>().is_err());
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn burst_below_one_is_rejected() {
        let mut settings = Settings::default();
        settings.rate_limit_burst_multiplier = 0.5;
        assert!(settings.validate().is_err());
    }
}
