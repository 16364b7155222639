use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::AppError;
use crate::model::{Alert, Sample};

pub const DEFAULT_THRESHOLD_PERCENT: f64 = 2.0;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Immutable spike rule: alert when the price rises more than
/// `threshold_percent` above the earliest sample inside `window`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    threshold_percent: f64,
    window: Duration,
    window_delta: TimeDelta,
}

impl WindowConfig {
    pub fn new(threshold_percent: f64, window: Duration) -> Result<Self, AppError> {
        if !threshold_percent.is_finite() || threshold_percent <= 0.0 {
            return Err(AppError::Config(format!(
                "threshold_percent must be finite and > 0, got {}",
                threshold_percent
            )));
        }
        if window.is_zero() {
            return Err(AppError::Config("window must be > 0".to_string()));
        }
        let window_delta = TimeDelta::from_std(window)
            .map_err(|e| AppError::Config(format!("window {:?} is too large: {}", window, e)))?;
        Ok(Self {
            threshold_percent,
            window,
            window_delta,
        })
    }

    pub fn threshold_percent(&self) -> f64 {
        self.threshold_percent
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            window: DEFAULT_WINDOW,
            window_delta: TimeDelta::seconds(DEFAULT_WINDOW.as_secs() as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpikeDetector {
    config: WindowConfig,
}

impl SpikeDetector {
    pub fn new(config: WindowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Compare `current` against the earliest sample of `history` that lies
    /// inside the trailing window ending at `current`'s timestamp.
    ///
    /// `history` must be in arrival order. It may already contain `current`;
    /// a baseline equal to the current price never alerts.
    pub fn evaluate<'a, I>(&self, ticker: &str, current: &Sample, history: I) -> Option<Alert>
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        // A window reaching past the earliest representable instant covers
        // the whole history.
        let window_start = current
            .timestamp()
            .checked_sub_signed(self.config.window_delta)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let baseline = history
            .into_iter()
            .find(|s| s.timestamp() >= window_start)?
            .price();

        let trigger = baseline * (1.0 + self.config.threshold_percent / 100.0);
        if current.price() <= trigger {
            return None;
        }

        Some(Alert {
            ticker: ticker.to_string(),
            baseline_price: baseline,
            current_price: current.price(),
            percent_increase: (current.price() - baseline) / baseline * 100.0,
            window: self.config.window,
        })
    }
}
