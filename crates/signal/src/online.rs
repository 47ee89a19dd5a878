//! Online ensemble: three incrementally-trained linear classifiers fed with
//! the outcomes of closed trades. Each member walks the state machine
//! `UNTRAINED -> WARMING -> READY -> ADAPTING -> READY`, where ADAPTING is
//! entered on rolling-accuracy drift and temporarily raises the learning
//! rate. Only READY and ADAPTING members vote.

use crate::features::FEATURE_DIM;
use crate::Vote;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Document name of the classifier checkpoint inside the state directory.
pub const ONLINE_CHECKPOINT: &str = "online_classifiers";

/// Labelled outcomes required before a member leaves WARMING.
pub const MIN_SAMPLES: u64 = 30;

const DRIFT_WINDOW: usize = 50;
const DRIFT_ACCURACY: f64 = 0.45;
const ADAPT_UPDATES: u32 = 20;
const ADAPT_LR_FACTOR: f64 = 3.0;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LearnerState {
    Untrained,
    Warming,
    Ready,
    Adapting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    Sgd,
    PassiveAggressive,
    Perceptron,
}

impl LearnerKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LearnerKind::Sgd => "sgd",
            LearnerKind::PassiveAggressive => "passive_aggressive",
            LearnerKind::Perceptron => "perceptron",
        }
    }
}

/// One incrementally-trained linear classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineClassifier {
    kind: LearnerKind,
    weights: Vec<f64>,
    bias: f64,
    learning_rate: f64,
    samples_seen: u64,
    state: LearnerState,
    recent_hits: VecDeque<bool>,
    adapt_remaining: u32,
}

impl OnlineClassifier {
    #[must_use]
    pub fn new(kind: LearnerKind) -> Self {
        let learning_rate = match kind {
            LearnerKind::Sgd => 0.05,
            LearnerKind::PassiveAggressive => 1.0,
            LearnerKind::Perceptron => 0.1,
        };
        Self {
            kind,
            weights: vec![0.0; FEATURE_DIM],
            bias: 0.0,
            learning_rate,
            samples_seen: 0,
            state: LearnerState::Untrained,
            recent_hits: VecDeque::with_capacity(DRIFT_WINDOW),
            adapt_remaining: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> LearnerState {
        self.state
    }

    #[must_use]
    pub fn kind(&self) -> LearnerKind {
        self.kind
    }

    #[must_use]
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    fn margin(&self, features: &[f64; FEATURE_DIM]) -> f64 {
        self.bias
            + self
                .weights
                .iter()
                .zip(features.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    fn effective_rate(&self) -> f64 {
        if self.state == LearnerState::Adapting {
            self.learning_rate * ADAPT_LR_FACTOR
        } else {
            self.learning_rate
        }
    }

    /// Signed vote; HOLD until the member has finished warming up.
    #[must_use]
    pub fn vote(&self, features: &[f64; FEATURE_DIM]) -> Vote {
        if !matches!(self.state, LearnerState::Ready | LearnerState::Adapting) {
            return Vote::hold();
        }
        let margin = self.margin(features);
        let confidence = match self.kind {
            LearnerKind::Sgd => (2.0 * sigmoid(margin) - 1.0).abs(),
            LearnerKind::PassiveAggressive | LearnerKind::Perceptron => margin.tanh().abs(),
        };
        let direction = if margin > 0.0 {
            1
        } else if margin < 0.0 {
            -1
        } else {
            0
        };
        Vote {
            direction,
            confidence,
        }
    }

    /// One prequential update: the pre-update margin is scored against the
    /// actual outcome before the weights move, feeding the drift window.
    /// `actual` is +1 for an up outcome, -1 for a down outcome.
    pub fn learn(&mut self, features: &[f64; FEATURE_DIM], actual: i32) {
        let actual = actual.signum();
        if actual == 0 {
            return;
        }
        let y = f64::from(actual);
        let margin = self.margin(features);

        if matches!(self.state, LearnerState::Ready | LearnerState::Adapting) {
            if self.recent_hits.len() == DRIFT_WINDOW {
                self.recent_hits.pop_front();
            }
            self.recent_hits.push_back(margin * y > 0.0);
        }

        let rate = self.effective_rate();
        match self.kind {
            LearnerKind::Sgd => {
                let y01 = (y + 1.0) / 2.0;
                let grad = sigmoid(margin) - y01;
                for (w, x) in self.weights.iter_mut().zip(features.iter()) {
                    *w -= rate * grad * x;
                }
                self.bias -= rate * grad;
            }
            LearnerKind::PassiveAggressive => {
                let loss = (1.0 - y * margin).max(0.0);
                if loss > 0.0 {
                    let norm_sq = features.iter().map(|x| x * x).sum::<f64>() + 1.0;
                    let tau = (loss / norm_sq).min(rate);
                    for (w, x) in self.weights.iter_mut().zip(features.iter()) {
                        *w += tau * y * x;
                    }
                    self.bias += tau * y;
                }
            }
            LearnerKind::Perceptron => {
                if margin * y <= 0.0 {
                    for (w, x) in self.weights.iter_mut().zip(features.iter()) {
                        *w += rate * y * x;
                    }
                    self.bias += rate * y;
                }
            }
        }

        self.samples_seen += 1;
        self.advance_state();
    }

    fn advance_state(&mut self) {
        match self.state {
            LearnerState::Untrained | LearnerState::Warming => {
                self.state = if self.samples_seen >= MIN_SAMPLES {
                    LearnerState::Ready
                } else {
                    LearnerState::Warming
                };
            }
            LearnerState::Ready => {
                if self.recent_hits.len() == DRIFT_WINDOW {
                    let hits = self.recent_hits.iter().filter(|h| **h).count();
                    let accuracy = hits as f64 / DRIFT_WINDOW as f64;
                    if accuracy < DRIFT_ACCURACY {
                        tracing::info!(
                            kind = self.kind.as_str(),
                            accuracy,
                            "rolling accuracy collapsed, raising learning rate"
                        );
                        self.state = LearnerState::Adapting;
                        self.adapt_remaining = ADAPT_UPDATES;
                        self.recent_hits.clear();
                    }
                }
            }
            LearnerState::Adapting => {
                self.adapt_remaining = self.adapt_remaining.saturating_sub(1);
                if self.adapt_remaining == 0 {
                    self.state = LearnerState::Ready;
                }
            }
        }
    }
}

/// The three-member online ensemble, checkpointed as one JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineEnsemble {
    members: Vec<OnlineClassifier>,
}

impl Default for OnlineEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl OnlineEnsemble {
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: vec![
                OnlineClassifier::new(LearnerKind::Sgd),
                OnlineClassifier::new(LearnerKind::PassiveAggressive),
                OnlineClassifier::new(LearnerKind::Perceptron),
            ],
        }
    }

    #[must_use]
    pub fn members(&self) -> &[OnlineClassifier] {
        &self.members
    }

    /// Mean signed vote of the members past warm-up, or `None` while no
    /// member is ready to vote.
    #[must_use]
    pub fn vote(&self, features: &[f64; FEATURE_DIM]) -> Option<Vote> {
        let votes: Vec<Vote> = self
            .members
            .iter()
            .map(|m| m.vote(features))
            .filter(|v| v.direction != 0 || v.confidence > 0.0)
            .collect();
        let voting = self
            .members
            .iter()
            .filter(|m| matches!(m.state(), LearnerState::Ready | LearnerState::Adapting))
            .count();
        if voting == 0 {
            return None;
        }
        let signed: f64 = votes
            .iter()
            .map(|v| f64::from(v.direction) * v.confidence)
            .sum::<f64>()
            / voting as f64;
        let direction = if signed > 0.0 {
            1
        } else if signed < 0.0 {
            -1
        } else {
            0
        };
        Some(Vote {
            direction,
            confidence: signed.abs(),
        })
    }

    /// Feeds one labelled outcome to every member.
    pub fn learn(&mut self, features: &[f64; FEATURE_DIM], actual: i32) {
        for member in &mut self.members {
            member.learn(features, actual);
        }
    }
}
