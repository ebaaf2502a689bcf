use envconfig::Envconfig;
use tokio::signal;

use checker::config::Config;
use checker::server::serve;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutting down gracefully...");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    // total inability to bind the listening port is the one fatal error
    let listener = tokio::net::TcpListener::bind(config.address)
        .await
        .expect("could not bind listening port");

    serve(config, listener, shutdown()).await;
}
