use std::future::Future;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::probe;
use crate::registry::ComponentRegistry;
use crate::router;
use crate::status;

/// Probe the dependencies once, then serve until shutdown resolves.
/// Startup survives every probe failure; only a strict-mode configuration
/// error (and the caller failing to bind the port) is fatal.
pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = ComponentRegistry::new();
    probe::initialize(&config, &registry)
        .await
        .expect("invalid configuration");

    let app = router::router(
        registry,
        status::hostname(),
        config.environment.clone(),
        config.export_prometheus,
    );

    tracing::info!(
        "listening on {:?}",
        listener.local_addr().expect("listener has no local address")
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("failed to serve http")
}
