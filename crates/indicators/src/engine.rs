#[cfg(feature = "ta-lib")]
use crate::extra;
use papertrade_core::{Bar, IndicatorSnapshot, Regime};

#[cfg(not(feature = "ta-lib"))]
use crate::fallback;
#[cfg(not(feature = "ta-lib"))]
use std::sync::Once;

/// Bars required before the full indicator set is computed.
pub const MIN_BARS: usize = 50;

/// Output of one engine run: the snapshot plus whether the window was deep
/// enough to compute it. An insufficient window yields the all-neutral
/// snapshot and the caller holds this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotResult {
    pub snapshot: IndicatorSnapshot,
    pub sufficient: bool,
}

/// Pure indicator computation over a window of bars (oldest first).
///
/// Same window, same snapshot; the engine performs no I/O and holds no
/// state between calls.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    min_bars: usize,
}

impl IndicatorEngine {
    #[must_use]
    pub fn new() -> Self {
        Self { min_bars: MIN_BARS }
    }

    /// Engine with a custom warm-up depth, for tests.
    #[must_use]
    pub fn with_min_bars(min_bars: usize) -> Self {
        Self { min_bars }
    }

    /// Computes the snapshot for the newest bar of the window.
    ///
    /// Fewer than `min_bars` bars produce the neutral snapshot with
    /// `sufficient == false`. Any non-finite intermediate value is replaced
    /// by the neutral default for its field before the snapshot is returned.
    #[must_use]
    pub fn compute(&self, window: &[Bar]) -> SnapshotResult {
        let close = window.last().map_or(0.0, |b| b.close);
        if window.len() < self.min_bars {
            return SnapshotResult {
                snapshot: IndicatorSnapshot::neutral(close),
                sufficient: false,
            };
        }

        let mut snapshot = self.compute_full(window, close);
        scrub(&mut snapshot, close);
        snapshot.regime = regime(snapshot.rsi, close, snapshot.sma_20);
        SnapshotResult {
            snapshot,
            sufficient: true,
        }
    }

    #[cfg(feature = "ta-lib")]
    fn compute_full(&self, window: &[Bar], close: f64) -> IndicatorSnapshot {
        use ta::indicators::{
            AverageTrueRange, BollingerBands, ExponentialMovingAverage,
            MovingAverageConvergenceDivergence, RateOfChange, RelativeStrengthIndex,
            SimpleMovingAverage,
        };
        use ta::{DataItem, Next};

        let mut rsi = RelativeStrengthIndex::new(14).expect("valid RSI period");
        let mut sma_20 = SimpleMovingAverage::new(20).expect("valid SMA period");
        let mut ema_20 = ExponentialMovingAverage::new(20).expect("valid EMA period");
        let mut roc = RateOfChange::new(10).expect("valid ROC period");
        let mut macd =
            MovingAverageConvergenceDivergence::new(12, 26, 9).expect("valid MACD periods");
        let mut bb = BollingerBands::new(20, 2.0).expect("valid band config");
        let mut atr = AverageTrueRange::new(14).expect("valid ATR period");

        let mut snapshot = IndicatorSnapshot::neutral(close);
        for bar in window {
            // Guard against inverted high/low from a misbehaving source.
            let high = bar.high.max(bar.low).max(bar.open).max(bar.close);
            let low = bar.low.min(bar.high).min(bar.open).min(bar.close);
            let item = match DataItem::builder()
                .open(bar.open)
                .high(high)
                .low(low)
                .close(bar.close)
                .volume(bar.volume.max(0.0))
                .build()
            {
                Ok(item) => item,
                Err(_) => continue,
            };

            snapshot.rsi = rsi.next(&item);
            snapshot.sma_20 = sma_20.next(bar.close);
            snapshot.ema_20 = ema_20.next(bar.close);
            snapshot.roc = roc.next(bar.close);
            let macd_out = macd.next(bar.close);
            snapshot.macd = macd_out.macd;
            snapshot.macd_signal = macd_out.signal;
            snapshot.macd_diff = macd_out.histogram;
            let bands = bb.next(bar.close);
            snapshot.bb_high = bands.upper;
            snapshot.bb_mid = bands.average;
            snapshot.bb_low = bands.lower;
            snapshot.atr = atr.next(&item);
        }

        let (stoch_k, stoch_d) = extra::stochastic(window, 14, 3);
        snapshot.stoch_k = stoch_k;
        snapshot.stoch_d = stoch_d;
        snapshot.williams_r = extra::williams_r(window, 14);
        snapshot.adx = extra::adx(window, 14);
        snapshot.cci = extra::cci(window, 20);
        snapshot.obv = extra::obv(window);
        snapshot.cmf = extra::cmf(window, 20);
        snapshot.ao = extra::awesome_oscillator(window);
        snapshot
    }

    /// Reduced set: Wilder RSI-14, SMA-20, EMA-20, ROC-10; everything else
    /// stays at its neutral default. Logged once per process.
    #[cfg(not(feature = "ta-lib"))]
    fn compute_full(&self, window: &[Bar], close: f64) -> IndicatorSnapshot {
        static FALLBACK_NOTICE: Once = Once::new();
        FALLBACK_NOTICE.call_once(|| {
            tracing::warn!(
                "built without the ta-lib feature; computing the reduced indicator set"
            );
        });

        let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
        let mut snapshot = IndicatorSnapshot::neutral(close);
        snapshot.rsi = fallback::rsi_wilder(&closes, 14);
        snapshot.sma_20 = fallback::sma(&closes, 20);
        snapshot.ema_20 = fallback::ema(&closes, 20);
        snapshot.roc = fallback::roc(&closes, 10);
        snapshot
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Regime label: overbought momentum above the mean is bullish, oversold
/// momentum below it bearish, anything else neutral.
fn regime(rsi: f64, close: f64, sma_20: f64) -> Regime {
    if rsi > 70.0 && close > sma_20 {
        Regime::Bullish
    } else if rsi < 30.0 && close < sma_20 {
        Regime::Bearish
    } else {
        Regime::Neutral
    }
}

/// Replaces every non-finite field with its neutral default. Nothing
/// non-finite may leave the engine.
fn scrub(snapshot: &mut IndicatorSnapshot, close: f64) {
    let fields: [(&str, &mut f64); 19] = [
        ("rsi", &mut snapshot.rsi),
        ("stoch_k", &mut snapshot.stoch_k),
        ("stoch_d", &mut snapshot.stoch_d),
        ("williams_r", &mut snapshot.williams_r),
        ("roc", &mut snapshot.roc),
        ("macd", &mut snapshot.macd),
        ("macd_signal", &mut snapshot.macd_signal),
        ("macd_diff", &mut snapshot.macd_diff),
        ("adx", &mut snapshot.adx),
        ("cci", &mut snapshot.cci),
        ("sma_20", &mut snapshot.sma_20),
        ("ema_20", &mut snapshot.ema_20),
        ("bb_high", &mut snapshot.bb_high),
        ("bb_mid", &mut snapshot.bb_mid),
        ("bb_low", &mut snapshot.bb_low),
        ("atr", &mut snapshot.atr),
        ("obv", &mut snapshot.obv),
        ("cmf", &mut snapshot.cmf),
        ("ao", &mut snapshot.ao),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            *value = IndicatorSnapshot::neutral_for(name, close);
        }
    }
}
