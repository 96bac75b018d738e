//! Request-scoped middleware: correlation ids and failure logging.

use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

/// Correlation id minted per request and echoed on the response extensions.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    response.extensions_mut().insert(id);
    response
}

/// Log 4xx at warn and 5xx at error, with the `ErrorReport` diagnostics the
/// handler attached to the response. Successful responses stay silent.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0)
        .unwrap_or_else(Uuid::nil);
    let started = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let report = response.extensions_mut().remove::<ErrorReport>();
    let source = report.as_ref().map_or("unknown", |report| report.source);
    let detail = report.map_or_else(
        || "no diagnostic available".to_string(),
        |report| report.messages.join(": "),
    );
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        error!(
            target = "fucina::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            source,
            detail = %detail,
            request_id = %request_id,
            "request failed",
        );
    } else {
        warn!(
            target = "fucina::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            source,
            detail = %detail,
            request_id = %request_id,
            "client request error",
        );
    }

    response
}
