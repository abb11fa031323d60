use actix_web::HttpResponse;
use serde_json::json;

/// Gateway error kinds with their client-visible HTTP mapping.
///
/// Per-request errors never crash the gateway: they are converted into one
/// of these kinds and rendered as an HTTP response by the [`ResponseError`]
/// implementation. Background task errors (refresh, heartbeat, janitor) are
/// logged at their origin and never surface here.
///
/// [`ResponseError`]: actix_web::error::ResponseError
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No enabled route matched the request path and method.
    #[error("No route matches: {path}")]
    RouteNotFound { path: String },

    /// The balancer found no healthy instance for the target service.
    #[error("Service {service} has no available instance")]
    NoHealthyInstance { service: String },

    /// The service registry rejected or failed a request.
    #[error("Registry error: {message}")]
    Registry { message: String },

    /// The local routes file could not be read or parsed.
    #[error("Local routes error: {message}")]
    LocalRoutes { message: String },

    /// Anything else that escaped the forwarding pipeline.
    #[error("Gateway error: {message}")]
    Internal { message: String },
}

impl actix_web::error::ResponseError for GatewayError {
    fn error_response(&self) -> HttpResponse {
        match self {
            GatewayError::RouteNotFound { path } => HttpResponse::NotFound().json(json!({
                "error": "Not Found",
                "message": format!("No route matches: {}", path),
            })),
            GatewayError::NoHealthyInstance { service } => {
                HttpResponse::ServiceUnavailable().json(json!({
                    "error": "Service Unavailable",
                    "message": format!("Service {} has no available instance", service),
                }))
            }
            GatewayError::Registry { message } => {
                HttpResponse::ServiceUnavailable().json(json!({
                    "error": "Service Unavailable",
                    "message": message,
                }))
            }
            GatewayError::LocalRoutes { message } | GatewayError::Internal { message } => {
                HttpResponse::BadGateway().json(json!({
                    "error": "Bad Gateway",
                    "message": message,
                }))
            }
        }
    }
}
