use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sample::Sample;
use crate::error::DecodeError;

/// Wire shape of one publisher frame.
#[derive(Debug, Deserialize, Serialize)]
struct PriceUpdateWire {
    ticker: String,
    price: f64,
    timestamp: String,
}

/// A decoded and validated price update.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub ticker: String,
    pub sample: Sample,
}

impl PriceUpdate {
    pub fn new(ticker: impl Into<String>, timestamp: DateTime<Utc>, price: f64) -> Result<Self, DecodeError> {
        let ticker = ticker.into().trim().to_string();
        if ticker.is_empty() {
            return Err(DecodeError::EmptyTicker);
        }
        Ok(Self {
            ticker,
            sample: Sample::new(timestamp, price)?,
        })
    }

    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let wire: PriceUpdateWire = serde_json::from_slice(raw)?;
        let timestamp = parse_timestamp(&wire.timestamp)?;
        Self::new(wire.ticker, timestamp, wire.price)
    }

    pub fn to_json(&self) -> Result<String, DecodeError> {
        let wire = PriceUpdateWire {
            ticker: self.ticker.clone(),
            price: self.sample.price(),
            timestamp: self.sample.timestamp().to_rfc3339(),
        };
        Ok(serde_json::to_string(&wire)?)
    }
}

/// Parse an ISO-8601 timestamp. Offset-less timestamps are taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DecodeError> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| DecodeError::InvalidTimestamp(s.to_string()))
}
