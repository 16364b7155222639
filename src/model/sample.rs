use chrono::{DateTime, Utc};

use crate::error::DecodeError;

/// One (timestamp, price) observation. The price is always finite and > 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    timestamp: DateTime<Utc>,
    price: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Result<Self, DecodeError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(DecodeError::InvalidPrice(price));
        }
        Ok(Self { timestamp, price })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn price(&self) -> f64 {
        self.price
    }
}
