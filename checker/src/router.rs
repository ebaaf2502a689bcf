use std::future::ready;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::prometheus::{setup_metrics_recorder, track_metrics};
use crate::registry::ComponentRegistry;
use crate::session::session_middleware;

#[derive(Clone)]
pub struct State {
    pub registry: ComponentRegistry,
    pub hostname: String,
    pub environment: String,
}

pub fn router(
    registry: ComponentRegistry,
    hostname: String,
    environment: String,
    metrics: bool,
) -> Router {
    let state = State {
        registry,
        hostname,
        environment,
    };

    let router = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::system_status))
        .route("/api/:component/:action", get(handlers::component_action))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(axum::middleware::from_fn(session_middleware))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when checker is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
