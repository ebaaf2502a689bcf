use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::registry::{ComponentKind, ComponentStatus};

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)
        .unwrap()
        .install_recorder()
        .unwrap()
}

/// Middleware to record some common HTTP metrics
/// Someday tower-http might provide a metrics middleware: https://github.com/tower-rs/tower-http/issues/57
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("checker_http_requests_total", &labels).increment(1);
    metrics::histogram!("checker_http_requests_duration_seconds", &labels).record(latency);

    response
}

/// Gauge per component: 1 connected, 0.5 degraded, 0 otherwise. Set once
/// at startup, when probing settles.
pub fn report_component_status(kind: ComponentKind, status: ComponentStatus) {
    let value = match status {
        ComponentStatus::Connected => 1.0,
        ComponentStatus::Degraded => 0.5,
        ComponentStatus::Checking | ComponentStatus::Unreachable => 0.0,
    };

    let labels = [("component", kind.to_string())];
    metrics::gauge!("checker_component_status", &labels).set(value);
}
