//! Bearer-token authentication in front of protected routes.
//!
//! Routes opt in through their `auth_config`. Tokens are taken from the
//! `Authorization` header, the `access_token` cookie, or `X-Auth-Token`,
//! and validated against the route's auth service when one is configured.
//! Browser clients are redirected to the configured login page; API
//! clients get a JSON 401.

use crate::models::route::AuthConfig;
use crate::plugins::{GatewayContext, GatewayPlugin, GatewayResponse};
use crate::utils::route_matcher::RouteMatcher;
use actix_web::http::StatusCode;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Validation timeout against the auth service.
const AUTH_SERVICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum token length accepted in pass-through mode (no auth service).
const MIN_TOKEN_LENGTH: usize = 10;

/// Outcome of a token validation attempt.
enum TokenVerdict {
    Valid,
    Invalid,
    /// The auth service was unreachable or answered with an unexpected
    /// status; resolved by the degrade policy.
    Degraded,
}

/// Authentication plugin, priority 50 (ahead of rate limiting).
pub struct AuthenticationPlugin {
    enabled: bool,
    degrade_allow: bool,
    client: reqwest::Client,
    matcher: RouteMatcher,
}

impl AuthenticationPlugin {
    pub fn new(enabled: bool, degrade_allow: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(AUTH_SERVICE_TIMEOUT)
            .build()
            .expect("Failed to create auth service HTTP client");

        Self {
            enabled,
            degrade_allow,
            client,
            matcher: RouteMatcher::new(),
        }
    }

    /// Whether the path is exempted by the route's public path patterns.
    fn is_public_path(&self, path: &str, auth_config: &AuthConfig) -> bool {
        auth_config
            .public_paths
            .iter()
            .any(|pattern| self.matcher.match_path(pattern, path))
    }

    /// Extracts the token, in precedence order: `Authorization: Bearer`,
    /// raw `Authorization`, `access_token` cookie, `X-Auth-Token`.
    fn extract_token(ctx: &GatewayContext) -> Option<String> {
        if let Some(auth_header) = ctx.header("authorization") {
            if let Some(token) = auth_header.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
            return Some(auth_header.to_string());
        }

        if let Some(cookie_header) = ctx.header("cookie") {
            for pair in cookie_header.split(';') {
                if let Some((name, value)) = pair.trim().split_once('=') {
                    if name == "access_token" && !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }

        ctx.header("x-auth-token").map(|t| t.to_string())
    }

    async fn validate_token(&self, ctx: &GatewayContext, token: &str) -> TokenVerdict {
        if token.is_empty() {
            return TokenVerdict::Invalid;
        }

        let auth_service = ctx
            .route
            .auth_service
            .as_ref()
            .filter(|s| !s.base_url.is_empty());

        let auth_service = match auth_service {
            Some(service) => service,
            None => {
                // Pass-through mode: any plausible token is accepted and
                // forwarded for the upstream to judge.
                return if token.len() >= MIN_TOKEN_LENGTH {
                    TokenVerdict::Valid
                } else {
                    TokenVerdict::Invalid
                };
            }
        };

        let validate_url = format!(
            "{}/api/v1/auth/validate",
            auth_service.base_url.trim_end_matches('/')
        );

        match self
            .client
            .post(&validate_url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
        {
            Ok(response) => match response.status().as_u16() {
                200 => TokenVerdict::Valid,
                401 => TokenVerdict::Invalid,
                status => {
                    log::warn!(
                        "Auth service {} answered {} for token validation",
                        auth_service.id,
                        status
                    );
                    TokenVerdict::Degraded
                }
            },
            Err(e) => {
                log::warn!("Auth service {} unreachable: {}", auth_service.id, e);
                TokenVerdict::Degraded
            }
        }
    }

    fn denied(&self, ctx: &GatewayContext, auth_config: &AuthConfig) -> GatewayResponse {
        let accept = ctx.header("accept").unwrap_or("");
        let is_xhr = ctx.header("x-requested-with") == Some("XMLHttpRequest");
        let is_api_request = is_xhr || accept.contains("application/json");

        if is_api_request {
            return GatewayResponse::json(
                StatusCode::UNAUTHORIZED,
                json!({
                    "error": "Unauthorized",
                    "message": "Authentication required",
                    "code": "AUTH_REQUIRED",
                }),
            )
            .with_header("WWW-Authenticate", "Bearer");
        }

        if let Some(login_redirect) = auth_config.login_redirect.as_deref() {
            let original = if ctx.query.is_empty() {
                ctx.path.clone()
            } else {
                format!("{}?{}", ctx.path, ctx.query)
            };
            let location = build_redirect_url(login_redirect, &original);

            return GatewayResponse {
                status: StatusCode::FOUND,
                headers: vec![("Location".to_string(), location)],
                body: actix_web::web::Bytes::new(),
            };
        }

        GatewayResponse::text(StatusCode::UNAUTHORIZED, "Unauthorized - please login")
            .with_header("WWW-Authenticate", "Bearer")
    }
}

/// Appends a `redirect` parameter to the login URL, preserving any query
/// string the login URL already carries.
pub fn build_redirect_url(login_url: &str, original_url: &str) -> String {
    let (base, existing_query) = match login_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (login_url, None),
    };

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    if let Some(query) = existing_query {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            serializer.append_pair(&name, &value);
        }
    }
    serializer.append_pair("redirect", original_url);

    format!("{}?{}", base, serializer.finish())
}

#[async_trait]
impl GatewayPlugin for AuthenticationPlugin {
    fn name(&self) -> &'static str {
        "authentication"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn before_request(&self, ctx: &mut GatewayContext) {
        let auth_config = match ctx.route.auth_config.clone() {
            Some(config) if config.require_auth => config,
            _ => return,
        };

        if self.is_public_path(&ctx.path, &auth_config) {
            return;
        }

        if let Some(token) = Self::extract_token(ctx) {
            let verdict = self.validate_token(ctx, &token).await;
            let allowed = match verdict {
                TokenVerdict::Valid => true,
                TokenVerdict::Invalid => false,
                TokenVerdict::Degraded => {
                    if self.degrade_allow {
                        log::warn!("Auth degraded, admitting {} {}", ctx.method, ctx.path);
                        true
                    } else {
                        false
                    }
                }
            };

            if allowed {
                ctx.authenticated = true;
                return;
            }
        }

        log::debug!("Unauthenticated request {} from {}", ctx.path, ctx.client_ip);
        ctx.short_circuit = Some(self.denied(ctx, &auth_config));
    }
}
