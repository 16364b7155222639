use anyhow::Result;
use tokio::sync::watch;

use spike_watch::config::{AlertSinkKind, Config};
use spike_watch::detector::SpikeDetector;
use spike_watch::feed::{StreamConnection, WsConnector};
use spike_watch::history::HistoryStore;
use spike_watch::logging::init_tracing;
use spike_watch::pipeline::IngestionPipeline;
use spike_watch::sink::{AlertSink, ConsoleSink, LogSink};

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required by rustls 0.23+ for wss://)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };
    let window = match config.detector.window_config() {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Invalid detector config: {:#}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging);
    tracing::info!(
        url = %config.stream.url,
        threshold_percent = window.threshold_percent(),
        window_secs = window.window().as_secs_f64(),
        history_capacity = config.detector.history_capacity,
        "Starting spike-watch"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received");
        }
        let _ = shutdown_tx.send(true);
    });

    let sink: Box<dyn AlertSink> = match config.alerts.sink {
        AlertSinkKind::Console => Box::new(ConsoleSink),
        AlertSinkKind::Log => Box::new(LogSink),
    };
    let mut pipeline = IngestionPipeline::new(
        HistoryStore::new(config.detector.history_capacity),
        SpikeDetector::new(window),
        sink,
    );
    let stats = pipeline.stats();

    let connection = StreamConnection::new(
        WsConnector::new(config.stream.url.clone()),
        config.stream.backoff_policy(),
    );
    connection.run(&mut pipeline, shutdown_rx).await;

    let totals = stats.snapshot();
    tracing::info!(
        received = totals.received,
        accepted = totals.accepted,
        rejected = totals.rejected,
        alerts = totals.alerts,
        tickers = pipeline.history().ticker_count(),
        "Client stopped"
    );
    Ok(())
}
