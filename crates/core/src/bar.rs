use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV candle for a symbol at an interval-aligned UTC timestamp.
///
/// `(symbol, timestamp)` is unique in the store; bars are never mutated after
/// insertion. Prices are `f64` because the indicator pipeline consumes plain
/// numeric vectors; accounting state uses `Decimal` (see the position types).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Typical price, used by CCI and CMF style indicators.
    #[must_use]
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Median price, used by the Awesome Oscillator.
    #[must_use]
    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

/// Normalizes a symbol to exchange convention: trimmed, upper-case.
#[must_use]
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_normalization_uppercases_and_trims() {
        assert_eq!(normalize_symbol(" btcusdt "), "BTCUSDT");
        assert_eq!(normalize_symbol("KaiaUsdt"), "KAIAUSDT");
    }

    #[test]
    fn typical_and_median_price() {
        let bar = Bar {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            open: 10.0,
            high: 12.0,
            low: 8.0,
            close: 10.0,
            volume: 1.0,
        };
        assert!((bar.typical_price() - 10.0).abs() < f64::EPSILON);
        assert!((bar.median_price() - 10.0).abs() < f64::EPSILON);
    }
}
