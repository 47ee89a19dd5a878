//! Deterministic rule predictor over the indicator snapshot. Advisory only:
//! the ensemble uses it to break ties and to veto weak ML votes, never as a
//! weighted member.

use crate::Vote;
use papertrade_core::IndicatorSnapshot;

/// Rule thresholds. Defaults follow the classic oscillator readings.
#[derive(Debug, Clone)]
pub struct RulePredictor {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for RulePredictor {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

impl RulePredictor {
    /// Scores the snapshot with three independent rules (RSI band, MACD
    /// histogram sign, Bollinger breach) and votes with the majority.
    /// Confidence is the fraction of rules that agree with the majority.
    #[must_use]
    pub fn vote(&self, snapshot: &IndicatorSnapshot, close: f64) -> Vote {
        let mut score = 0i32;
        let mut fired = 0u32;

        if snapshot.rsi < self.rsi_oversold {
            score += 1;
            fired += 1;
        } else if snapshot.rsi > self.rsi_overbought {
            score -= 1;
            fired += 1;
        }

        if snapshot.macd_diff > 0.0 {
            score += 1;
            fired += 1;
        } else if snapshot.macd_diff < 0.0 {
            score -= 1;
            fired += 1;
        }

        if close < snapshot.bb_low {
            score += 1;
            fired += 1;
        } else if close > snapshot.bb_high {
            score -= 1;
            fired += 1;
        }

        if fired == 0 || score == 0 {
            return Vote::hold();
        }
        Vote {
            direction: score.signum(),
            confidence: f64::from(score.unsigned_abs()) / f64::from(fired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_snapshot_votes_hold() {
        let rule = RulePredictor::default();
        let vote = rule.vote(&IndicatorSnapshot::neutral(100.0), 100.0);
        assert_eq!(vote.direction, 0);
        assert!(vote.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn oversold_breach_votes_buy_with_full_agreement() {
        let mut snap = IndicatorSnapshot::neutral(100.0);
        snap.rsi = 20.0;
        snap.macd_diff = 0.5;
        // close below the lower band
        let vote = RulePredictor::default().vote(&snap, 97.0);
        assert_eq!(vote.direction, 1);
        assert!((vote.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overbought_with_mixed_macd_votes_sell_weakly() {
        let mut snap = IndicatorSnapshot::neutral(100.0);
        snap.rsi = 80.0;
        snap.macd_diff = 0.5;
        snap.bb_high = 110.0;
        let vote = RulePredictor::default().vote(&snap, 100.0);
        // one rule each way cancels out
        assert_eq!(vote.direction, 0);
    }
}
