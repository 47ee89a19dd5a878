use crate::batch::BatchModel;
use crate::ensemble;
use crate::features::{self, FEATURE_DIM};
use crate::online::{OnlineEnsemble, ONLINE_CHECKPOINT};
use crate::rule::RulePredictor;
use chrono::Utc;
use papertrade_core::{Direction, IndicatorSnapshot, Prediction};
use papertrade_data::JsonStore;
use std::collections::{HashMap, VecDeque};

/// Signals kept per symbol for the control surface.
const SIGNAL_RING: usize = 50;

/// One prediction per tick from the hybrid ensemble, plus the bookkeeping
/// that feeds closed-trade outcomes back into the online classifiers.
///
/// Prediction and learning are decoupled: `predict` never blocks on a model
/// update, and `learn_from_close` does a single bounded incremental fit plus
/// one checkpoint write.
pub struct SignalEngine {
    batch: Option<BatchModel>,
    online: OnlineEnsemble,
    rule: RulePredictor,
    entry_threshold: f64,
    store: JsonStore,
    recent: HashMap<String, VecDeque<Prediction>>,
    pending: HashMap<String, [f64; FEATURE_DIM]>,
}

impl SignalEngine {
    /// Loads the batch artifact and the online-classifier checkpoint from
    /// the state directory. Both are optional; a cold start begins with an
    /// untrained ensemble and no batch model.
    #[must_use]
    pub fn new(store: JsonStore, entry_threshold: f64) -> Self {
        let batch = BatchModel::load(&store);
        let online = store
            .load_or_none::<OnlineEnsemble>(ONLINE_CHECKPOINT)
            .unwrap_or_default();
        Self {
            batch,
            online,
            rule: RulePredictor::default(),
            entry_threshold,
            store,
            recent: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn set_entry_threshold(&mut self, entry_threshold: f64) {
        self.entry_threshold = entry_threshold;
    }

    fn model_id(&self) -> String {
        let mut parts = Vec::new();
        if self.batch.is_some() {
            parts.push("batch");
        }
        parts.push("online");
        parts.push("rule");
        format!("hybrid({})", parts.join("+"))
    }

    /// Produces the tick's prediction. An insufficient window always yields
    /// a hold; otherwise the hybrid vote is computed and anything under the
    /// entry threshold is flattened to a hold with its confidence kept for
    /// inspection.
    pub fn predict(
        &mut self,
        symbol: &str,
        snapshot: &IndicatorSnapshot,
        close: f64,
        sufficient: bool,
    ) -> Prediction {
        let prediction = if sufficient {
            let feats = features::extract(snapshot, close);
            let batch_vote = self.batch.as_ref().map(|m| m.vote(&feats));
            let online_vote = self.online.vote(&feats);
            let rule_vote = self.rule.vote(snapshot, close);
            let (direction, confidence) = ensemble::combine(batch_vote, online_vote, rule_vote);

            let direction = if confidence < self.entry_threshold {
                Direction::Hold
            } else {
                direction
            };
            Prediction {
                symbol: symbol.to_string(),
                direction,
                confidence,
                horizon_bars: 1,
                model_id: self.model_id(),
                created_at: Utc::now(),
            }
        } else {
            Prediction::hold(symbol, &self.model_id())
        };

        let ring = self.recent.entry(symbol.to_string()).or_default();
        if ring.len() == SIGNAL_RING {
            ring.pop_front();
        }
        ring.push_back(prediction.clone());
        prediction
    }

    /// The most recent prediction emitted for `symbol`, if any.
    #[must_use]
    pub fn current_signal(&self, symbol: &str) -> Option<Prediction> {
        self.recent.get(symbol).and_then(|r| r.back()).cloned()
    }

    /// Records the features a position was opened on, keyed by position id,
    /// so the outcome can be fed back once the trade closes.
    pub fn note_open(&mut self, position_id: &str, snapshot: &IndicatorSnapshot, close: f64) {
        self.pending
            .insert(position_id.to_string(), features::extract(snapshot, close));
    }

    /// Feeds a closed trade's outcome to the online ensemble and checkpoints
    /// it. `won` means the position's direction was the right call. Unknown
    /// ids (positions opened before a restart) are skipped silently.
    pub fn learn_from_close(&mut self, position_id: &str, opened_long: bool, won: bool) {
        let Some(feats) = self.pending.remove(position_id) else {
            return;
        };
        let direction_sign = if opened_long { 1 } else { -1 };
        let actual = if won { direction_sign } else { -direction_sign };
        self.online.learn(&feats, actual);
        if let Err(e) = self.store.save(ONLINE_CHECKPOINT, &self.online) {
            tracing::warn!("failed to checkpoint online classifiers: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BATCH_ARTIFACT;

    fn engine_with_dir(dir: &std::path::Path, threshold: f64) -> SignalEngine {
        SignalEngine::new(JsonStore::open(dir).unwrap(), threshold)
    }

    fn bullish_snapshot() -> IndicatorSnapshot {
        let mut snap = IndicatorSnapshot::neutral(100.0);
        snap.rsi = 22.0;
        snap.macd_diff = 0.8;
        snap
    }

    fn buy_biased_artifact() -> BatchModel {
        // Heavy negative weight on the RSI feature: oversold -> buy.
        let mut weights = vec![0.0; FEATURE_DIM];
        weights[0] = -4.0;
        BatchModel {
            model_id: "batch-test".to_string(),
            weights,
            intercept: 0.0,
        }
    }

    #[test]
    fn insufficient_data_always_holds() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_dir(dir.path(), 0.6);
        let p = engine.predict("BTCUSDT", &bullish_snapshot(), 100.0, false);
        assert_eq!(p.direction, Direction::Hold);
        assert!(p.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_under_threshold_flattens_to_hold() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(dir.path()).unwrap();
        store.save(BATCH_ARTIFACT, &buy_biased_artifact()).unwrap();

        // Threshold above any achievable confidence forces a hold even
        // though the batch model clearly votes buy.
        let mut strict = SignalEngine::new(store, 1.01);
        let p = strict.predict("BTCUSDT", &bullish_snapshot(), 100.0, true);
        assert_eq!(p.direction, Direction::Hold);
        assert!(p.confidence > 0.0);

        let mut lenient = engine_with_dir(dir.path(), 0.1);
        let p = lenient.predict("BTCUSDT", &bullish_snapshot(), 100.0, true);
        assert_eq!(p.direction, Direction::Buy);
    }

    #[test]
    fn current_signal_returns_the_latest_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_dir(dir.path(), 0.6);
        assert!(engine.current_signal("BTCUSDT").is_none());

        engine.predict("BTCUSDT", &IndicatorSnapshot::neutral(100.0), 100.0, true);
        let latest = engine.predict("BTCUSDT", &bullish_snapshot(), 100.0, false);
        let current = engine.current_signal("BTCUSDT").unwrap();
        assert_eq!(current.created_at, latest.created_at);
        assert!(engine.current_signal("ETHUSDT").is_none());
    }

    #[test]
    fn learn_from_close_checkpoints_the_ensemble() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine_with_dir(dir.path(), 0.6);
        let snap = bullish_snapshot();
        engine.note_open("BTCUSDT_LONG_1", &snap, 100.0);
        engine.learn_from_close("BTCUSDT_LONG_1", true, true);

        assert!(dir.path().join(format!("{ONLINE_CHECKPOINT}.json")).exists());
        // Unknown ids are ignored without touching the checkpoint.
        engine.learn_from_close("UNKNOWN_ID", true, false);
    }

    #[test]
    fn checkpoint_is_restored_on_construction() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut engine = engine_with_dir(dir.path(), 0.6);
            let snap = bullish_snapshot();
            for i in 0..40 {
                let id = format!("BTCUSDT_LONG_{i}");
                engine.note_open(&id, &snap, 100.0);
                engine.learn_from_close(&id, true, true);
            }
        }
        let restored = engine_with_dir(dir.path(), 0.6);
        assert!(restored.online.members()[0].samples_seen() >= 40);
    }
}
