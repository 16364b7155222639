use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::detector::SpikeDetector;
use crate::feed::MessageHandler;
use crate::history::HistoryStore;
use crate::model::PriceUpdate;
use crate::sink::AlertSink;

/// Shared counters for operational visibility. Clones observe the same values.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    received: Arc<AtomicU64>,
    accepted: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
    alerts: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStatsSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub alerts: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
        }
    }
}

/// decode -> append -> evaluate -> emit, one message at a time.
pub struct IngestionPipeline<S> {
    history: HistoryStore,
    detector: SpikeDetector,
    sink: S,
    stats: PipelineStats,
}

impl<S: AlertSink> IngestionPipeline<S> {
    pub fn new(history: HistoryStore, detector: SpikeDetector, sink: S) -> Self {
        Self {
            history,
            detector,
            sink,
            stats: PipelineStats::default(),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Malformed or invalid payloads are logged and dropped.
    pub fn on_message(&mut self, raw: &[u8]) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let update = match PriceUpdate::decode(raw) {
            Ok(update) => update,
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    raw = %String::from_utf8_lossy(raw),
                    "Dropping undecodable price update"
                );
                return;
            }
        };
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);

        let PriceUpdate { ticker, sample } = update;
        self.history.append(&ticker, sample);

        let alert = self
            .detector
            .evaluate(&ticker, &sample, self.history.snapshot(&ticker));
        if let Some(alert) = alert {
            self.stats.alerts.fetch_add(1, Ordering::Relaxed);
            self.sink.emit(&alert);
        }
    }
}

impl<S: AlertSink> MessageHandler for IngestionPipeline<S> {
    fn on_message(&mut self, raw: &[u8]) -> anyhow::Result<()> {
        IngestionPipeline::on_message(self, raw);
        Ok(())
    }
}
