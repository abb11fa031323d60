//! Request id middleware.
//!
//! Honors an inbound `X-Request-ID` (or `X-Trace-ID`), mints a UUIDv4
//! otherwise, stores the id in the request extensions for the pipeline,
//! and echoes it on the response.

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error as ActixError, HttpMessage, HttpRequest};
use futures::future::{LocalBoxFuture, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};

/// The request id attached to every request.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Resolves the request id for a request: the value stored by the
/// middleware, or a fresh extraction when the middleware did not run
/// (e.g. in handler-level tests).
pub fn request_id_for(req: &HttpRequest) -> String {
    if let Some(id) = req.extensions().get::<RequestId>() {
        return id.0.clone();
    }
    extract_or_mint(req.headers())
}

fn extract_or_mint(headers: &actix_web::http::header::HeaderMap) -> String {
    headers
        .get("X-Request-ID")
        .or_else(|| headers.get("X-Trace-ID"))
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Middleware factory, wrapped around the whole app.
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware;

impl RequestIdMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestIdMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Transform = RequestIdService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        futures::future::ready(Ok(RequestIdService {
            service: Arc::new(service),
        }))
    }
}

/// Middleware service: stamps the id before the handler, echoes it after.
pub struct RequestIdService<S> {
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestIdService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let request_id = extract_or_mint(req.headers());
        req.extensions_mut().insert(RequestId(request_id.clone()));

        Box::pin(async move {
            let mut response = service.call(req).await?;

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("x-request-id"), value);
            }

            Ok(response)
        })
    }
}
