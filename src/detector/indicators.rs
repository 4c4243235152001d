//! Technical indicators and line fitting used by the detectors.
//!
//! Series functions return one entry per input value; `None` marks the warm-up
//! region where the indicator is not yet defined.

/// Simple moving average.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    if period == 0 {
        result.resize(values.len(), None);
        return result;
    }

    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 < period {
            result.push(None);
        } else {
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Exponential moving average seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    if period == 0 || values.len() < period {
        result.resize(values.len(), None);
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;

    result.resize(period - 1, None);
    result.push(Some(seed));

    let mut prev = seed;
    for &value in &values[period..] {
        prev = (value - prev) * multiplier + prev;
        result.push(Some(prev));
    }

    result
}

/// EMA over a series that itself has a warm-up region.
fn ema_of_defined(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let offset = values.iter().position(Option::is_some).unwrap_or(values.len());
    let defined: Vec<f64> = values[offset..].iter().map(|v| v.unwrap_or(0.0)).collect();

    let mut result = vec![None; offset];
    result.extend(ema(&defined, period));
    result
}

/// Relative Strength Index with Wilder smoothing.
///
/// avg_loss == 0 yields 100; avg_gain == 0 yields 0.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    let p = period as f64;
    for i in (period + 1)..n {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        result[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// MACD line and signal line.
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);

    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    let signal_line = ema_of_defined(&line, signal);

    (line, signal_line)
}

/// Bollinger bands as (upper, middle, lower).
pub fn bollinger_bands(
    values: &[f64],
    period: usize,
    num_std: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let middle = sma(values, period);
    let mut upper = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());

    for (i, mid) in middle.iter().enumerate() {
        match mid {
            Some(mid) => {
                let window = &values[i + 1 - period..=i];
                let std = std_dev(window);
                upper.push(Some(mid + num_std * std));
                lower.push(Some(mid - num_std * std));
            }
            None => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    (upper, middle, lower)
}

/// True range per bar.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(value);
    }

    tr
}

/// Average true range with Wilder smoothing.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let tr = true_range(high, low, close);
    let n = tr.len();
    let mut result = vec![None; n];
    if period == 0 || n < period {
        return result;
    }

    let mut value = tr[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(value);
    let p = period as f64;
    for i in period..n {
        value = (value * (p - 1.0) + tr[i]) / p;
        result[i] = Some(value);
    }

    result
}

/// Maximum of the `window` values strictly before `end`.
pub fn prior_max(values: &[f64], end: usize, window: usize) -> Option<f64> {
    if window == 0 || end < window || end > values.len() {
        return None;
    }
    values[end - window..end].iter().copied().reduce(f64::max)
}

/// Minimum of the `window` values strictly before `end`.
pub fn prior_min(values: &[f64], end: usize, window: usize) -> Option<f64> {
    if window == 0 || end < window || end > values.len() {
        return None;
    }
    values[end - window..end].iter().copied().reduce(f64::min)
}

/// Minimum over the trailing `window` values, including the last one.
pub fn trailing_min(values: &[f64], window: usize) -> Option<f64> {
    prior_min(values, values.len(), window)
}

/// Maximum over the trailing `window` values, including the last one.
pub fn trailing_max(values: &[f64], window: usize) -> Option<f64> {
    prior_max(values, values.len(), window)
}

/// Fractional change of the last value against the value `lookback` bars earlier.
pub fn pct_change(values: &[f64], lookback: usize) -> Option<f64> {
    let n = values.len();
    if lookback == 0 || n <= lookback {
        return None;
    }
    let base = values[n - 1 - lookback];
    if base == 0.0 {
        return None;
    }
    Some((values[n - 1] - base) / base)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Latest defined value of a series.
pub fn last_value(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

/// Value one bar before the latest.
pub fn previous_value(series: &[Option<f64>]) -> Option<f64> {
    let n = series.len();
    if n < 2 {
        return None;
    }
    series[n - 2]
}

/// Least-squares line through `(x, y)` points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation; 0 when y has no variance
    pub r: f64,
    /// RMS residual relative to mean y
    pub residual_dev: f64,
}

impl LineFit {
    /// Fit a line; `None` with fewer than two distinct x values.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut syy = 0.0;
        let mut sxy = 0.0;
        for &(x, y) in points {
            let dx = x - mean_x;
            let dy = y - mean_y;
            sxx += dx * dx;
            syy += dy * dy;
            sxy += dx * dy;
        }

        if sxx == 0.0 {
            return None;
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;
        let r = if syy > 0.0 { sxy / (sxx * syy).sqrt() } else { 0.0 };

        let sq_residuals: f64 = points
            .iter()
            .map(|&(x, y)| {
                let e = y - (slope * x + intercept);
                e * e
            })
            .sum();
        let residual_dev = if mean_y != 0.0 {
            (sq_residuals / n).sqrt() / mean_y.abs()
        } else {
            f64::INFINITY
        };

        Some(Self {
            slope,
            intercept,
            r,
            residual_dev,
        })
    }

    pub fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        assert_eq!(result[3], Some(3.0));
        assert_eq!(result[4], Some(4.0));
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);

        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(2.0));
        // (4 - 2) * 0.5 + 2
        assert_eq!(result[3], Some(3.0));
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(last_value(&rsi(&rising, 14)), Some(100.0));

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert_eq!(last_value(&rsi(&falling, 14)), Some(0.0));

        assert!(last_value(&rsi(&rising[..10], 14)).is_none());
    }

    #[test]
    fn test_rsi_balanced_zigzag_near_fifty() {
        let zigzag: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let value = last_value(&rsi(&zigzag, 14)).unwrap();
        assert!(value > 40.0 && value < 60.0);
    }

    #[test]
    fn test_macd_on_trend() {
        let rising: Vec<f64> = (0..80).map(|i| 100.0 + i as f64 * 0.5).collect();
        let (line, signal) = macd(&rising, 12, 26, 9);

        assert!(line[24].is_none());
        assert!(line[25].is_some());
        assert!(signal[25 + 7].is_none());
        assert!(signal[25 + 8].is_some());
        assert!(last_value(&line).unwrap() > 0.0);
    }

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let flat = vec![50.0; 25];
        let (upper, middle, lower) = bollinger_bands(&flat, 20, 2.0);
        assert_eq!(last_value(&upper), Some(50.0));
        assert_eq!(last_value(&middle), Some(50.0));
        assert_eq!(last_value(&lower), Some(50.0));
    }

    #[test]
    fn test_atr_constant_range() {
        let high = vec![101.0; 20];
        let low = vec![99.0; 20];
        let close = vec![100.0; 20];
        let values = atr(&high, &low, &close, 14);
        assert!(values[12].is_none());
        assert_relative_eq!(last_value(&values).unwrap(), 2.0);
    }

    #[test]
    fn test_prior_window_excludes_current() {
        let values = vec![1.0, 5.0, 3.0, 9.0];
        assert_eq!(prior_max(&values, 3, 3), Some(5.0));
        assert_eq!(prior_min(&values, 3, 2), Some(3.0));
        assert_eq!(trailing_max(&values, 2), Some(9.0));
        assert_eq!(prior_max(&values, 2, 3), None);
    }

    #[test]
    fn test_pct_change() {
        let values = vec![100.0, 105.0, 110.0];
        assert_relative_eq!(pct_change(&values, 2).unwrap(), 0.10);
        assert!(pct_change(&values, 3).is_none());
    }

    #[test]
    fn test_line_fit_exact() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        let fit = LineFit::fit(&points).unwrap();

        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.r, 1.0, epsilon = 1e-12);
        assert!(fit.residual_dev < 1e-12);
    }

    #[test]
    fn test_line_fit_flat_has_zero_r() {
        let points = vec![(0.0, 5.0), (3.0, 5.0), (7.0, 5.0)];
        let fit = LineFit::fit(&points).unwrap();
        assert_eq!(fit.r, 0.0);
        assert_eq!(fit.slope, 0.0);
        assert!(LineFit::fit(&[(1.0, 1.0), (1.0, 2.0)]).is_none());
    }
}
