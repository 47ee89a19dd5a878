//! Feature extraction: maps an indicator snapshot onto the fixed-width
//! numeric vector the linear predictors consume. Every component is scaled
//! into roughly `[-1, 1]` so no single indicator dominates the dot products.

use papertrade_core::{IndicatorSnapshot, Regime};

/// Width of the feature vector, bias excluded.
pub const FEATURE_DIM: usize = 14;

fn clamp_unit(v: f64) -> f64 {
    v.clamp(-1.0, 1.0)
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den.abs() < 1e-12 {
        0.0
    } else {
        num / den
    }
}

/// Builds the feature vector for one snapshot at the given close price.
///
/// The output is always finite: the snapshot is finite by the engine's
/// contract and every ratio here guards its denominator.
#[must_use]
pub fn extract(snapshot: &IndicatorSnapshot, close: f64) -> [f64; FEATURE_DIM] {
    let band_width = snapshot.bb_high - snapshot.bb_low;
    let bb_position = clamp_unit(2.0 * safe_div(close - snapshot.bb_low, band_width) - 1.0);
    let regime = match snapshot.regime {
        Regime::Bullish => 1.0,
        Regime::Bearish => -1.0,
        Regime::Neutral => 0.0,
    };

    [
        (snapshot.rsi - 50.0) / 50.0,
        (snapshot.stoch_k - 50.0) / 50.0,
        (snapshot.stoch_d - 50.0) / 50.0,
        (snapshot.williams_r + 50.0) / 50.0,
        clamp_unit(snapshot.roc / 10.0),
        clamp_unit(safe_div(snapshot.macd, close) * 100.0),
        clamp_unit(safe_div(snapshot.macd_diff, close) * 100.0),
        snapshot.adx / 100.0,
        clamp_unit(snapshot.cci / 200.0),
        clamp_unit(safe_div(close - snapshot.sma_20, snapshot.sma_20) * 10.0),
        bb_position,
        clamp_unit(safe_div(snapshot.atr, close) * 10.0),
        clamp_unit(snapshot.cmf),
        regime,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_snapshot_maps_near_zero() {
        let snap = IndicatorSnapshot::neutral(100.0);
        let features = extract(&snap, 100.0);
        assert_eq!(features.len(), FEATURE_DIM);
        for (i, f) in features.iter().enumerate() {
            assert!(f.is_finite(), "feature {i} not finite");
            assert!(f.abs() <= 1.0, "feature {i} out of range: {f}");
        }
        // RSI 50, stoch 50, williams -50 and cmf 0 all land on zero.
        assert!(features[0].abs() < f64::EPSILON);
        assert!(features[1].abs() < f64::EPSILON);
        assert!(features[3].abs() < f64::EPSILON);
        assert!(features[12].abs() < f64::EPSILON);
    }

    #[test]
    fn overbought_snapshot_has_positive_momentum_features() {
        let mut snap = IndicatorSnapshot::neutral(100.0);
        snap.rsi = 85.0;
        snap.stoch_k = 95.0;
        snap.regime = Regime::Bullish;
        let features = extract(&snap, 100.0);
        assert!(features[0] > 0.5);
        assert!(features[1] > 0.8);
        assert!((features[13] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_close_produces_finite_features() {
        let snap = IndicatorSnapshot::neutral(0.0);
        let features = extract(&snap, 0.0);
        assert!(features.iter().all(|f| f.is_finite()));
    }
}
