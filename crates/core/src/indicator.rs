use serde::{Deserialize, Serialize};

/// Market regime label attached to each indicator snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    Bullish,
    Bearish,
    Neutral,
}

/// The fixed indicator set computed for one bar of one symbol.
///
/// Every field is a finite number: the indicator engine replaces anything
/// non-finite with the neutral default before the snapshot leaves it, so no
/// NaN ever reaches the signal path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub williams_r: f64,
    pub roc: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_diff: f64,
    pub adx: f64,
    pub cci: f64,
    pub sma_20: f64,
    pub ema_20: f64,
    pub bb_high: f64,
    pub bb_mid: f64,
    pub bb_low: f64,
    pub atr: f64,
    pub obv: f64,
    pub cmf: f64,
    pub ao: f64,
    pub regime: Regime,
}

impl IndicatorSnapshot {
    pub const NEUTRAL_RSI: f64 = 50.0;
    pub const NEUTRAL_STOCH: f64 = 50.0;
    pub const NEUTRAL_WILLIAMS: f64 = -50.0;

    /// The all-neutral snapshot used when the window is too short or a
    /// computation fails. Bollinger bands default to a ±2% envelope around
    /// the given close; everything else takes its documented neutral value.
    #[must_use]
    pub fn neutral(close: f64) -> Self {
        Self {
            rsi: Self::NEUTRAL_RSI,
            stoch_k: Self::NEUTRAL_STOCH,
            stoch_d: Self::NEUTRAL_STOCH,
            williams_r: Self::NEUTRAL_WILLIAMS,
            roc: 0.0,
            macd: 0.0,
            macd_signal: 0.0,
            macd_diff: 0.0,
            adx: 0.0,
            cci: 0.0,
            sma_20: 0.0,
            ema_20: 0.0,
            bb_high: close * 1.02,
            bb_mid: close,
            bb_low: close * 0.98,
            atr: 0.0,
            obv: 0.0,
            cmf: 0.0,
            ao: 0.0,
            regime: Regime::Neutral,
        }
    }

    /// Returns the neutral default for the named field, used when scrubbing
    /// non-finite values at the engine boundary.
    #[must_use]
    pub fn neutral_for(field: &str, close: f64) -> f64 {
        match field {
            "rsi" => Self::NEUTRAL_RSI,
            "stoch_k" | "stoch_d" => Self::NEUTRAL_STOCH,
            "williams_r" => Self::NEUTRAL_WILLIAMS,
            "bb_high" => close * 1.02,
            "bb_mid" => close,
            "bb_low" => close * 0.98,
            _ => 0.0,
        }
    }

    /// True when every field carries a finite value. A snapshot violating
    /// this is a bug in the engine, not a data condition.
    #[must_use]
    pub fn all_finite(&self) -> bool {
        [
            self.rsi,
            self.stoch_k,
            self.stoch_d,
            self.williams_r,
            self.roc,
            self.macd,
            self.macd_signal,
            self.macd_diff,
            self.adx,
            self.cci,
            self.sma_20,
            self.ema_20,
            self.bb_high,
            self.bb_mid,
            self.bb_low,
            self.atr,
            self.obv,
            self.cmf,
            self.ao,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_snapshot_uses_documented_defaults() {
        let snap = IndicatorSnapshot::neutral(100.0);
        assert!((snap.rsi - 50.0).abs() < f64::EPSILON);
        assert!((snap.stoch_k - 50.0).abs() < f64::EPSILON);
        assert!((snap.williams_r + 50.0).abs() < f64::EPSILON);
        assert!((snap.bb_high - 102.0).abs() < 1e-9);
        assert!((snap.bb_low - 98.0).abs() < 1e-9);
        assert!((snap.macd).abs() < f64::EPSILON);
        assert_eq!(snap.regime, Regime::Neutral);
        assert!(snap.all_finite());
    }

    #[test]
    fn all_finite_detects_nan() {
        let mut snap = IndicatorSnapshot::neutral(100.0);
        snap.atr = f64::NAN;
        assert!(!snap.all_finite());
    }
}
