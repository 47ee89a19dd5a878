//! Batch model: a linear classifier trained offline and loaded from a JSON
//! artifact at startup. Absence of the artifact is not an error; the hybrid
//! ensemble simply renormalises without it.

use crate::features::FEATURE_DIM;
use crate::Vote;
use papertrade_data::JsonStore;
use serde::{Deserialize, Serialize};

/// Document name of the batch artifact inside the state directory.
pub const BATCH_ARTIFACT: &str = "batch_model";

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Logistic classifier weights produced by offline training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchModel {
    pub model_id: String,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl BatchModel {
    /// Loads the artifact, returning `None` when it is absent, corrupt, or
    /// shaped for a different feature width. A warning is logged in the
    /// degraded cases.
    #[must_use]
    pub fn load(store: &JsonStore) -> Option<Self> {
        let model: Self = store.load_or_none(BATCH_ARTIFACT)?;
        if model.weights.len() != FEATURE_DIM {
            tracing::warn!(
                model_id = %model.model_id,
                got = model.weights.len(),
                want = FEATURE_DIM,
                "ignoring batch artifact with mismatched feature width"
            );
            return None;
        }
        tracing::info!(model_id = %model.model_id, "loaded batch model artifact");
        Some(model)
    }

    /// Probability of the up class, mapped to a signed vote. Confidence is
    /// the distance from the decision boundary, `|2p - 1|`.
    #[must_use]
    pub fn vote(&self, features: &[f64; FEATURE_DIM]) -> Vote {
        let z = self.intercept
            + self
                .weights
                .iter()
                .zip(features.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        let p = sigmoid(z);
        let direction = if p > 0.5 {
            1
        } else if p < 0.5 {
            -1
        } else {
            0
        };
        Vote {
            direction,
            confidence: (2.0 * p - 1.0).abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(weights: Vec<f64>, intercept: f64) -> BatchModel {
        BatchModel {
            model_id: "batch-test".to_string(),
            weights,
            intercept,
        }
    }

    #[test]
    fn positive_margin_votes_buy() {
        let mut weights = vec![0.0; FEATURE_DIM];
        weights[0] = 2.0;
        let m = model(weights, 0.0);
        let mut features = [0.0; FEATURE_DIM];
        features[0] = 1.0;
        let vote = m.vote(&features);
        assert_eq!(vote.direction, 1);
        assert!(vote.confidence > 0.7);
    }

    #[test]
    fn zero_margin_is_a_hold() {
        let m = model(vec![0.0; FEATURE_DIM], 0.0);
        let vote = m.vote(&[0.5; FEATURE_DIM]);
        assert_eq!(vote.direction, 0);
        assert!(vote.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn missing_artifact_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        assert!(BatchModel::load(&store).is_none());
    }

    #[test]
    fn mismatched_width_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store
            .save(BATCH_ARTIFACT, &model(vec![1.0, 2.0], 0.0))
            .unwrap();
        assert!(BatchModel::load(&store).is_none());
    }

    #[test]
    fn well_formed_artifact_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store
            .save(BATCH_ARTIFACT, &model(vec![0.1; FEATURE_DIM], -0.05))
            .unwrap();
        let loaded = BatchModel::load(&store).unwrap();
        assert_eq!(loaded.model_id, "batch-test");
        assert_eq!(loaded.weights.len(), FEATURE_DIM);
    }
}
