//! Service middleware for request metrics.
//!
//! ## Metrics Exposed
//!
//! - `request` - path, method, status and latency per request
//! - `resolve` - selection size, candidate count, group counts per `/get_seeds`

use axum::{extract::Request, middleware::Next, response::Response};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

/// Metrics middleware that records request counts and latency.
///
/// Logged through tracing so the numbers can be aggregated from logs.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    info!(
        target: "spawn_resolver::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request_metric"
    );

    response
}

/// Collapse numeric path segments to keep metric cardinality low.
fn normalize_path(path: &str) -> String {
    static NUMERIC_SEGMENT: OnceLock<regex_lite::Regex> = OnceLock::new();
    let re = NUMERIC_SEGMENT.get_or_init(|| {
        regex_lite::Regex::new(r"/[0-9]+").expect("numeric segment pattern is valid")
    });
    re.replace_all(path, "/:id").to_string()
}

/// Record one resolve call.
pub fn record_resolve_metrics(
    selection_size: usize,
    candidate_count: usize,
    group_count: usize,
    dropped_groups: usize,
    latency_ms: u64,
) {
    info!(
        target: "spawn_resolver::metrics",
        metric_type = "resolve",
        selection_size,
        candidate_count,
        group_count,
        dropped_groups,
        latency_ms,
        "resolve_metric"
    );
}
