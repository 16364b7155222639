use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::model::Alert;

/// Receives raised alerts. Implementations must return quickly and must not
/// fail the caller.
pub trait AlertSink: Send {
    fn emit(&self, alert: &Alert);
}

impl<S: AlertSink + ?Sized> AlertSink for Box<S> {
    fn emit(&self, alert: &Alert) {
        (**self).emit(alert)
    }
}

/// Prints one line per alert to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl AlertSink for ConsoleSink {
    fn emit(&self, alert: &Alert) {
        println!("{}", alert);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn emit(&self, alert: &Alert) {
        tracing::warn!(
            target: "alert",
            ticker = %alert.ticker,
            percent_increase = alert.percent_increase,
            baseline_price = alert.baseline_price,
            current_price = alert.current_price,
            window_secs = alert.window.as_secs_f64(),
            "{}",
            alert
        );
    }
}

/// Forwards alerts into a bounded channel without ever waiting on it.
/// Alerts that do not fit are dropped and counted.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Alert>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Alert>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AlertSink for ChannelSink {
    fn emit(&self, alert: &Alert) {
        if let Err(e) = self.tx.try_send(alert.clone()) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(ticker = %alert.ticker, error = %e, "Alert channel unavailable, dropping alert");
        }
    }
}
