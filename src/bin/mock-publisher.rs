use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;

use spike_watch::config::Config;
use spike_watch::logging::init_tracing;
use spike_watch::publisher::{serve, MockPublisher};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);

    let listener = TcpListener::bind(&config.publisher.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.publisher.bind))?;
    tracing::info!(bind = %config.publisher.bind, "Mock WebSocket publisher started");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received");
        }
        let _ = shutdown_tx.send(true);
    });

    serve(listener, MockPublisher::new(&config.publisher), shutdown_rx).await?;
    tracing::info!("Server stopped");
    Ok(())
}
