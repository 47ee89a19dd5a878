//! Reduced indicator set used when the crate is built without the `ta-lib`
//! feature: Wilder RSI-14, SMA-20, EMA-20, and ROC-10. Everything else in
//! the snapshot takes its neutral default.

/// Wilder-smoothed RSI. Returns 50 when the series is too short and 100/0
/// at the all-gains/all-losses extremes.
#[must_use]
pub fn rsi_wilder(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return 50.0;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in closes[..=period].windows(2) {
        let delta = pair[1] - pair[0];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    for pair in closes[period..].windows(2) {
        let delta = pair[1] - pair[0];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss <= 0.0 {
        if avg_gain <= 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Simple moving average of the trailing `period` values.
#[must_use]
pub fn sma(values: &[f64], period: usize) -> f64 {
    if period == 0 || values.len() < period {
        return 0.0;
    }
    values[values.len() - period..].iter().sum::<f64>() / period as f64
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values.
#[must_use]
pub fn ema(values: &[f64], period: usize) -> f64 {
    if period == 0 || values.len() < period {
        return 0.0;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current = values[..period].iter().sum::<f64>() / period as f64;
    for value in &values[period..] {
        current = alpha * value + (1.0 - alpha) * current;
    }
    current
}

/// Rate of change over `period`, in percent.
#[must_use]
pub fn roc(values: &[f64], period: usize) -> f64 {
    if values.len() < period + 1 {
        return 0.0;
    }
    let previous = values[values.len() - 1 - period];
    if previous == 0.0 {
        return 0.0;
    }
    100.0 * (values[values.len() - 1] - previous) / previous
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + f64::from(i)).collect();
        assert!((rsi_wilder(&rising, 14) - 100.0).abs() < 1e-9);

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - f64::from(i)).collect();
        assert!(rsi_wilder(&falling, 14).abs() < 1e-9);

        let flat = vec![100.0; 30];
        assert!((rsi_wilder(&flat, 14) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_short_series_is_neutral() {
        assert!((rsi_wilder(&[1.0, 2.0], 14) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_of_constants_is_the_constant() {
        let values = vec![7.0; 25];
        assert!((sma(&values, 20) - 7.0).abs() < 1e-12);
        assert!(sma(&values[..5], 20).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_converges_toward_recent_values() {
        let mut values = vec![100.0; 20];
        values.extend(std::iter::repeat(200.0).take(60));
        let e = ema(&values, 20);
        assert!(e > 190.0 && e <= 200.0, "ema = {e}");
    }

    #[test]
    fn roc_measures_percent_change() {
        let mut values = vec![100.0; 11];
        values[10] = 110.0;
        assert!((roc(&values, 10) - 10.0).abs() < 1e-9);
        assert!(roc(&values[..5], 10).abs() < f64::EPSILON);
    }
}
