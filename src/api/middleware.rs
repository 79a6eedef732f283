use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, warn};

use crate::observability::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Record request metrics and log every failed response.
pub async fn log_responses(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let start = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed = start.elapsed();

    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "route" => route.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "route" => route.clone())
        .record(elapsed.as_secs_f64());

    let elapsed_ms = elapsed.as_millis();
    if status.is_server_error() {
        error!(
            target: "haven::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            route = %route,
            elapsed_ms,
            "request failed",
        );
    } else if status.is_client_error() {
        warn!(
            target: "haven::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            route = %route,
            elapsed_ms,
            "client request error",
        );
    }

    response
}
