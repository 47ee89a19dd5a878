//! Hybrid combination: weighted batch/online vote with the rule predictor
//! acting as tie-breaker and low-confidence veto.

use crate::Vote;
use papertrade_core::Direction;

/// Default weight of the batch model in the hybrid vote.
pub const BATCH_WEIGHT: f64 = 0.7;
/// Default weight of the online ensemble in the hybrid vote.
pub const ONLINE_WEIGHT: f64 = 0.3;

/// Rule confidence at or above which an opposing rule vote vetoes the
/// combined ML vote down to a hold.
const RULE_VETO_CONFIDENCE: f64 = 0.8;

/// Combines the available predictor votes into one direction+confidence.
///
/// Weights renormalise over the predictors actually present. When the
/// weighted sum is exactly zero the rule vote breaks the tie; when the rule
/// strongly opposes the weighted result, the result is vetoed to a hold.
/// The entry threshold is applied by the caller, not here.
#[must_use]
pub fn combine(batch: Option<Vote>, online: Option<Vote>, rule: Vote) -> (Direction, f64) {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    if let Some(v) = batch {
        weighted += BATCH_WEIGHT * f64::from(v.direction) * v.confidence;
        weight_sum += BATCH_WEIGHT;
    }
    if let Some(v) = online {
        weighted += ONLINE_WEIGHT * f64::from(v.direction) * v.confidence;
        weight_sum += ONLINE_WEIGHT;
    }

    if weight_sum <= 0.0 || weighted == 0.0 {
        // No ML opinion; the advisory rule is all there is.
        return (Direction::from_sign(f64::from(rule.direction)), rule.confidence);
    }

    let signed = weighted / weight_sum;
    if rule.direction != 0
        && rule.confidence >= RULE_VETO_CONFIDENCE
        && f64::from(rule.direction) * signed < 0.0
    {
        return (Direction::Hold, 0.0);
    }
    (Direction::from_sign(signed), signed.abs())
}
