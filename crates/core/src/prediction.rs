use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Directional call emitted by the signal engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl Direction {
    /// Sign convention used by the predictors: +1 buy, -1 sell, 0 hold.
    #[must_use]
    pub fn as_sign(&self) -> i32 {
        match self {
            Direction::Buy => 1,
            Direction::Sell => -1,
            Direction::Hold => 0,
        }
    }

    /// Maps a weighted-vote sign back to a direction. Zero is a hold.
    #[must_use]
    pub fn from_sign(sign: f64) -> Self {
        if sign > 0.0 {
            Direction::Buy
        } else if sign < 0.0 {
            Direction::Sell
        } else {
            Direction::Hold
        }
    }
}

/// One prediction for one symbol at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub symbol: String,
    pub direction: Direction,
    /// Ensemble confidence in `[0, 1]`.
    pub confidence: f64,
    /// How many bars ahead the prediction is meant to cover.
    pub horizon_bars: u32,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// A hold prediction, used whenever the pipeline cannot or should not act.
    #[must_use]
    pub fn hold(symbol: &str, model_id: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            direction: Direction::Hold,
            confidence: 0.0,
            horizon_bars: 1,
            model_id: model_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_round_trip() {
        assert_eq!(Direction::from_sign(0.4), Direction::Buy);
        assert_eq!(Direction::from_sign(-0.1), Direction::Sell);
        assert_eq!(Direction::from_sign(0.0), Direction::Hold);
        assert_eq!(Direction::Buy.as_sign(), 1);
        assert_eq!(Direction::Sell.as_sign(), -1);
    }

    #[test]
    fn hold_prediction_has_zero_confidence() {
        let p = Prediction::hold("BTCUSDT", "hybrid");
        assert_eq!(p.direction, Direction::Hold);
        assert!(p.confidence.abs() < f64::EPSILON);
    }
}
