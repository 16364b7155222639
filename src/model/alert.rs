use std::fmt;
use std::time::Duration;

/// A detected price spike for one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub ticker: String,
    pub baseline_price: f64,
    pub current_price: f64,
    pub percent_increase: f64,
    pub window: Duration,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "*** ALERT ***: {} price increased by {:.2}% (from {} to {}) within the last {} seconds.",
            self.ticker,
            self.percent_increase,
            self.baseline_price,
            self.current_price,
            self.window.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_all_fields() {
        let alert = Alert {
            ticker: "AAPL".to_string(),
            baseline_price: 100.0,
            current_price: 103.0,
            percent_increase: 3.0,
            window: Duration::from_secs(60),
        };
        assert_eq!(
            alert.to_string(),
            "*** ALERT ***: AAPL price increased by 3.00% (from 100 to 103) within the last 60 seconds."
        );
    }
}
