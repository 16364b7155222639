//! Simulated upstream publisher: a random-walk price per ticker, streamed to
//! every connected WebSocket client as one JSON text frame per update.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use crate::config::PublisherConfig;
use crate::error::DecodeError;
use crate::feed::connection::wait_for_shutdown;
use crate::model::PriceUpdate;

pub const DEFAULT_TICKERS: &[(&str, f64)] = &[
    ("AAPL", 150.0),
    ("GOOGL", 2800.0),
    ("MSFT", 300.0),
    ("AMZN", 3400.0),
];

const MIN_PRICE: f64 = 0.01;

#[derive(Debug)]
pub struct MockPublisher {
    prices: Vec<(String, f64)>,
    max_step_percent: f64,
    min_interval: Duration,
    max_interval: Duration,
    rng: StdRng,
}

impl MockPublisher {
    pub fn new(config: &PublisherConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: &PublisherConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &PublisherConfig, rng: StdRng) -> Self {
        Self {
            prices: DEFAULT_TICKERS
                .iter()
                .map(|(ticker, price)| (ticker.to_string(), *price))
                .collect(),
            max_step_percent: config.max_step_percent,
            min_interval: Duration::from_millis(config.min_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms.max(config.min_interval_ms)),
            rng,
        }
    }

    pub fn price(&self, ticker: &str) -> Option<f64> {
        self.prices
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, price)| *price)
    }

    /// Move one randomly chosen ticker by up to `max_step_percent` in either
    /// direction, rounded to cents and floored at 0.01.
    pub fn next_update(&mut self) -> Result<PriceUpdate, DecodeError> {
        let idx = self.rng.gen_range(0..self.prices.len());
        let step = self.max_step_percent / 100.0;
        let change = if step > 0.0 {
            self.rng.gen_range(-step..=step)
        } else {
            0.0
        };

        let (ticker, price) = &mut self.prices[idx];
        let next = ((*price * (1.0 + change)) * 100.0).round() / 100.0;
        *price = next.max(MIN_PRICE);

        PriceUpdate::new(ticker.clone(), Utc::now(), *price)
    }

    pub fn next_delay(&mut self) -> Duration {
        let min_ms = self.min_interval.as_millis() as u64;
        let max_ms = self.max_interval.as_millis() as u64;
        Duration::from_millis(self.rng.gen_range(min_ms..=max_ms))
    }
}

/// Accept clients on `listener` until shutdown, streaming updates from one
/// shared random walk to each of them.
pub async fn serve(
    listener: TcpListener,
    publisher: MockPublisher,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let publisher = Arc::new(Mutex::new(publisher));
    tracing::info!(addr = ?listener.local_addr().ok(), "Mock publisher listening");

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let publisher = Arc::clone(&publisher);
                    let client_shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        stream_to_client(stream, addr, publisher, client_shutdown).await;
                    });
                }
                Err(e) => tracing::warn!(error = %e, "accept error"),
            },
        }
    }

    tracing::info!("Mock publisher stopped");
    Ok(())
}

async fn stream_to_client(
    stream: TcpStream,
    addr: SocketAddr,
    publisher: Arc<Mutex<MockPublisher>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(addr = %addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    tracing::info!(addr = %addr, "Client connected");
    let (mut write, mut read) = ws.split();

    'feed: loop {
        let (update, delay) = {
            let mut guard = publisher.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            (guard.next_update().and_then(|u| u.to_json()), guard.next_delay())
        };

        let text = match update {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(addr = %addr, error = %e, "Failed to build price update");
                break;
            }
        };

        if let Err(e) = write.send(Message::Text(text)).await {
            tracing::info!(addr = %addr, error = %e, "Client disconnected");
            break;
        }

        // Inbound client frames must not cut the interval short.
        let next_send = tokio::time::sleep(delay);
        tokio::pin!(next_send);
        loop {
            tokio::select! {
                _ = &mut next_send => break,
                _ = wait_for_shutdown(&mut shutdown) => {
                    let _ = write.send(Message::Close(None)).await;
                    break 'feed;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        tracing::info!(addr = %addr, "Client disconnected");
                        break 'feed;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    tracing::info!(addr = %addr, "Stopped sending updates");
}
