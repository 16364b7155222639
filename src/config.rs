use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::detector::{WindowConfig, DEFAULT_THRESHOLD_PERCENT};
use crate::feed::BackoffPolicy;
use crate::history::DEFAULT_HISTORY_CAPACITY;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub detector: DetectorConfig,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
    pub publisher: PublisherConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub url: String,
    pub reconnect_delay_ms: u64,
    pub connect_refused_delay_ms: u64,
    pub connect_error_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765".to_string(),
            reconnect_delay_ms: 1_000,
            connect_refused_delay_ms: 5_000,
            connect_error_delay_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub threshold_percent: f64,
    pub window: String,
    pub history_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            window: "60s".to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSinkKind {
    #[default]
    Console,
    Log,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub sink: AlertSinkKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub bind: String,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub max_step_percent: f64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8765".to_string(),
            min_interval_ms: 500,
            max_interval_ms: 2_000,
            max_step_percent: 1.5,
        }
    }
}

/// Parse a duration string such as "500ms", "60s", "1m" or "1h".
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (num_str, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        bail!(
            "invalid duration '{}': expected a suffix of ms/s/m/h, e.g. '60s'",
            s
        );
    };

    let n: u64 = num_str.trim().parse().with_context(|| {
        format!(
            "invalid duration '{}': quantity must be a positive integer",
            s
        )
    })?;
    if n == 0 {
        bail!("invalid duration '{}': quantity must be > 0", s);
    }

    let ms = n
        .checked_mul(unit_ms)
        .with_context(|| format!("invalid duration '{}': value is too large", s))?;
    Ok(Duration::from_millis(ms))
}

impl StreamConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            reconnect: Duration::from_millis(self.reconnect_delay_ms),
            connect_refused: Duration::from_millis(self.connect_refused_delay_ms),
            connect_error: Duration::from_millis(self.connect_error_delay_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url)
            .with_context(|| format!("stream.url '{}' is not a valid URL", self.url))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            bail!(
                "stream.url '{}': unsupported scheme '{}', expected ws or wss",
                self.url,
                parsed.scheme()
            );
        }
        if self.reconnect_delay_ms > self.connect_refused_delay_ms
            || self.reconnect_delay_ms > self.connect_error_delay_ms
        {
            bail!("stream.reconnect_delay_ms must not exceed the connect failure delays");
        }
        Ok(())
    }
}

impl DetectorConfig {
    pub fn window_config(&self) -> Result<WindowConfig> {
        let window = parse_duration(&self.window).context("detector.window is invalid")?;
        WindowConfig::new(self.threshold_percent, window).context("detector config is invalid")
    }
}

impl PublisherConfig {
    fn validate(&self) -> Result<()> {
        if self.min_interval_ms == 0 || self.min_interval_ms > self.max_interval_ms {
            bail!("publisher intervals must satisfy 0 < min_interval_ms <= max_interval_ms");
        }
        if !self.max_step_percent.is_finite() || self.max_step_percent < 0.0 {
            bail!("publisher.max_step_percent must be finite and >= 0");
        }
        Ok(())
    }
}

impl Config {
    /// Load `.env`, the TOML file named by `SPIKE_WATCH_CONFIG` (must exist)
    /// or `config/default.toml` (may be absent), then environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var("SPIKE_WATCH_CONFIG") {
            Ok(path) => Self::load_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&config_str).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SPIKE_WATCH_URL") {
            self.stream.url = url;
        }
        if let Ok(v) = std::env::var("SPIKE_WATCH_THRESHOLD_PERCENT") {
            self.detector.threshold_percent = v
                .parse()
                .with_context(|| format!("SPIKE_WATCH_THRESHOLD_PERCENT '{}' is not a number", v))?;
        }
        if let Ok(v) = std::env::var("SPIKE_WATCH_WINDOW") {
            self.detector.window = v;
        }
        if let Ok(v) = std::env::var("SPIKE_WATCH_HISTORY_CAPACITY") {
            self.detector.history_capacity = v
                .parse()
                .with_context(|| format!("SPIKE_WATCH_HISTORY_CAPACITY '{}' is not an integer", v))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;
        self.detector.window_config()?;
        if self.detector.history_capacity == 0 {
            bail!("detector.history_capacity must be > 0");
        }
        self.publisher.validate()?;
        Ok(())
    }
}
