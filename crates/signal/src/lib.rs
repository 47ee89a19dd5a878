//! Hybrid signal engine.
//!
//! One prediction per tick, combined from three sources: a file-backed batch
//! model trained offline, an online ensemble of three incrementally-trained
//! linear classifiers, and a deterministic rule predictor that only advises.
//! Closed-trade outcomes flow back into the online members, whose state is
//! checkpointed as a JSON document after every update.

pub mod batch;
pub mod engine;
pub mod ensemble;
pub mod features;
pub mod online;
pub mod rule;

pub use batch::{BatchModel, BATCH_ARTIFACT};
pub use engine::SignalEngine;
pub use features::FEATURE_DIM;
pub use online::{LearnerKind, LearnerState, OnlineEnsemble, ONLINE_CHECKPOINT};
pub use rule::RulePredictor;

/// A single predictor's opinion: a signed direction (+1 buy, -1 sell,
/// 0 hold) and a confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vote {
    pub direction: i32,
    pub confidence: f64,
}

impl Vote {
    #[must_use]
    pub fn hold() -> Self {
        Self {
            direction: 0,
            confidence: 0.0,
        }
    }
}
