//! HTTP-level middleware (cross-cutting concerns).
//!
//! Responsibility:
//! - Request-Id generation + propagation (X-Request-Id), before the gate reads it
//! - Access logging / request tracing (TraceLayer), tagged with request id and client ip
//! - Body size limits
//! - Global timeouts
//!
//! Downstream calls have their own client timeout; this one bounds the whole request.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::error_handling::HandleErrorLayer;
use axum::http::{HeaderName, Request, StatusCode};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::context::REQUEST_ID_HEADER;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Apply HTTP-level middleware to the given Router.
///
/// `forwarded_ip_header` is only used to tag the access-log span.
pub fn apply(router: Router, forwarded_ip_header: HeaderName) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(move |req: &Request<Body>| {
        let header = |name: &HeaderName| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        tracing::info_span!(
            "http",
            method = %req.method(),
            uri = %req.uri(),
            request_id = %header(&REQUEST_ID_HEADER),
            client_ip = %header(&forwarded_ip_header),
        )
    });

    let layers = ServiceBuilder::new()
        // Make the service error `Infallible` by converting errors into responses.
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            if err.is::<tower::timeout::error::Elapsed>() {
                StatusCode::REQUEST_TIMEOUT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        // Access log sees the plain body type, so it sits outside the limit.
        .layer(trace)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    router.layer(layers)
}
