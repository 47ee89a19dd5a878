//! Indicators computed directly over the bar window, covering what the
//! streaming TA path does not: stochastic %K/%D, Williams %R, ADX, CCI,
//! OBV, CMF, and the Awesome Oscillator. All functions take the window
//! oldest-first and return neutral values when the window is too short,
//! never NaN.

use papertrade_core::Bar;

fn highest_high(bars: &[Bar]) -> f64 {
    bars.iter().map(|b| b.high).fold(f64::MIN, f64::max)
}

fn lowest_low(bars: &[Bar]) -> f64 {
    bars.iter().map(|b| b.low).fold(f64::MAX, f64::min)
}

fn percent_k(bars: &[Bar], period: usize, at: usize) -> Option<f64> {
    if at + 1 < period {
        return None;
    }
    let slice = &bars[at + 1 - period..=at];
    let hh = highest_high(slice);
    let ll = lowest_low(slice);
    let range = hh - ll;
    if range <= 0.0 {
        Some(50.0)
    } else {
        Some(100.0 * (bars[at].close - ll) / range)
    }
}

/// Stochastic oscillator: raw %K over `k_period`, %D as the simple average
/// of the last `d_period` %K values.
#[must_use]
pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> (f64, f64) {
    if bars.len() < k_period {
        return (50.0, 50.0);
    }
    let last = bars.len() - 1;
    let k = percent_k(bars, k_period, last).unwrap_or(50.0);

    let mut sum = 0.0;
    let mut count = 0usize;
    for back in 0..d_period {
        if back > last {
            break;
        }
        if let Some(v) = percent_k(bars, k_period, last - back) {
            sum += v;
            count += 1;
        }
    }
    let d = if count == 0 { 50.0 } else { sum / count as f64 };
    (k, d)
}

/// Williams %R over `period`: 0 at the window high, -100 at the window low.
#[must_use]
pub fn williams_r(bars: &[Bar], period: usize) -> f64 {
    if bars.len() < period {
        return -50.0;
    }
    let slice = &bars[bars.len() - period..];
    let hh = highest_high(slice);
    let ll = lowest_low(slice);
    let range = hh - ll;
    if range <= 0.0 {
        -50.0
    } else {
        -100.0 * (hh - bars[bars.len() - 1].close) / range
    }
}

/// Wilder's Average Directional Index over `period`.
///
/// Returns 0 when the window is shorter than `2 * period + 1` bars, the
/// point at which the double Wilder smoothing is first defined.
#[must_use]
pub fn adx(bars: &[Bar], period: usize) -> f64 {
    if period == 0 || bars.len() < 2 * period + 1 {
        return 0.0;
    }

    let mut trs = Vec::with_capacity(bars.len() - 1);
    let mut plus_dms = Vec::with_capacity(bars.len() - 1);
    let mut minus_dms = Vec::with_capacity(bars.len() - 1);
    for pair in bars.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let up = cur.high - prev.high;
        let down = prev.low - cur.low;
        plus_dms.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dms.push(if down > up && down > 0.0 { down } else { 0.0 });
        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        trs.push(tr);
    }

    // Wilder smoothing: seed with the plain sum of the first period.
    let mut s_tr: f64 = trs[..period].iter().sum();
    let mut s_plus: f64 = plus_dms[..period].iter().sum();
    let mut s_minus: f64 = minus_dms[..period].iter().sum();

    let dx_at = |s_tr: f64, s_plus: f64, s_minus: f64| -> f64 {
        if s_tr <= 0.0 {
            return 0.0;
        }
        let plus_di = 100.0 * s_plus / s_tr;
        let minus_di = 100.0 * s_minus / s_tr;
        let di_sum = plus_di + minus_di;
        if di_sum <= 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / di_sum
        }
    };

    let mut dxs = vec![dx_at(s_tr, s_plus, s_minus)];
    for i in period..trs.len() {
        s_tr = s_tr - s_tr / period as f64 + trs[i];
        s_plus = s_plus - s_plus / period as f64 + plus_dms[i];
        s_minus = s_minus - s_minus / period as f64 + minus_dms[i];
        dxs.push(dx_at(s_tr, s_plus, s_minus));
    }

    if dxs.len() < period {
        return 0.0;
    }
    let mut adx: f64 = dxs[..period].iter().sum::<f64>() / period as f64;
    for dx in &dxs[period..] {
        adx = (adx * (period as f64 - 1.0) + dx) / period as f64;
    }
    adx
}

/// Chaikin Money Flow over `period`: money-flow-volume sum over volume sum,
/// in `[-1, 1]`.
#[must_use]
pub fn cmf(bars: &[Bar], period: usize) -> f64 {
    if bars.len() < period {
        return 0.0;
    }
    let slice = &bars[bars.len() - period..];
    let mut mfv_sum = 0.0;
    let mut vol_sum = 0.0;
    for bar in slice {
        let range = bar.high - bar.low;
        if range > 0.0 {
            let multiplier = ((bar.close - bar.low) - (bar.high - bar.close)) / range;
            mfv_sum += multiplier * bar.volume;
        }
        vol_sum += bar.volume;
    }
    if vol_sum <= 0.0 {
        0.0
    } else {
        mfv_sum / vol_sum
    }
}

/// Commodity Channel Index over `period`:
/// `(tp - SMA(tp)) / (0.015 * mean |tp - SMA(tp)|)`.
#[must_use]
pub fn cci(bars: &[Bar], period: usize) -> f64 {
    if period == 0 || bars.len() < period {
        return 0.0;
    }
    let slice = &bars[bars.len() - period..];
    let tps: Vec<f64> = slice.iter().map(Bar::typical_price).collect();
    let mean = tps.iter().sum::<f64>() / period as f64;
    let mean_dev = tps.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;
    if mean_dev <= 0.0 {
        0.0
    } else {
        (tps[tps.len() - 1] - mean) / (0.015 * mean_dev)
    }
}

/// On-Balance Volume accumulated over the whole window.
#[must_use]
pub fn obv(bars: &[Bar]) -> f64 {
    let mut total = 0.0;
    for pair in bars.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur.close > prev.close {
            total += cur.volume;
        } else if cur.close < prev.close {
            total -= cur.volume;
        }
    }
    total
}

/// Awesome Oscillator: SMA(5) minus SMA(34) of the bar median price.
#[must_use]
pub fn awesome_oscillator(bars: &[Bar]) -> f64 {
    const FAST: usize = 5;
    const SLOW: usize = 34;
    if bars.len() < SLOW {
        return 0.0;
    }
    let median_mean = |n: usize| -> f64 {
        let slice = &bars[bars.len() - n..];
        slice.iter().map(Bar::median_price).sum::<f64>() / n as f64
    };
    median_mean(FAST) - median_mean(SLOW)
}
