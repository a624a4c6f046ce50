//! Simple Moving Average (SMA).
//!
//! Rolling mean of close prices over a trailing window ending at bar `i`
//! inclusive. First valid value at index `period - 1`.

use super::Indicator;
use crate::domain::PriceSeries;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, series: &PriceSeries) -> Vec<f64> {
        rolling_mean(&series.closes(), self.period)
    }
}

/// Trailing mean over `window` values; NaN during warmup or when the window
/// contains a NaN.
///
/// The sum is rolled forward in O(n) as deviations from the first value of
/// the current NaN-free run, so a constant window yields that constant
/// exactly. A NaN restarts the run.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || n < window {
        return result;
    }

    let mut anchor = 0.0;
    let mut sum = 0.0;
    let mut run = 0usize;
    for (i, &value) in values.iter().enumerate() {
        if value.is_nan() {
            run = 0;
            sum = 0.0;
            continue;
        }
        if run == 0 {
            anchor = value;
        }
        run += 1;
        sum += value - anchor;
        if run > window {
            sum -= values[i - window] - anchor;
        }
        if run >= window {
            result[i] = anchor + sum / window as f64;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};
    use chrono::{Duration, NaiveDate};

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        PriceSeries::from_closes("TEST", start, Duration::hours(1), closes).unwrap()
    }

    #[test]
    fn sma_5_basic() {
        let s = series(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let result = Sma::new(5).compute(&s);

        assert_eq!(result.len(), 7);
        for (i, v) in result.iter().enumerate().take(4) {
            assert!(v.is_nan(), "expected NaN at index {i}");
        }
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[5], 13.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_1_is_close() {
        let s = series(&[100.0, 200.0, 300.0]);
        let result = Sma::new(1).compute(&s);
        assert_approx(result[0], 100.0, DEFAULT_EPSILON);
        assert_approx(result[1], 200.0, DEFAULT_EPSILON);
        assert_approx(result[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_nan_propagation() {
        let values = [10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0];
        let result = rolling_mean(&values, 3);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_approx(result[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_lookback_and_name() {
        assert_eq!(Sma::new(20).lookback(), 19);
        assert_eq!(Sma::new(1).lookback(), 0);
        assert_eq!(Sma::new(20).name(), "sma_20");
    }

    #[test]
    fn sma_too_few_bars() {
        let result = rolling_mean(&[10.0, 11.0], 5);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn truncated_series_matches_full_prefix() {
        let closes: Vec<f64> = (0..200).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let full = rolling_mean(&closes, 20);
        let truncated = rolling_mean(&closes[..100], 20);
        for i in 0..100 {
            if truncated[i].is_nan() {
                assert!(full[i].is_nan());
            } else {
                assert_eq!(truncated[i], full[i], "look-ahead at bar {i}");
            }
        }
    }

    #[test]
    fn constant_window_is_exact() {
        for &price in &[0.1, 0.3, 100.3, 27123.45, 1.1, 3.7] {
            let values = vec![price; 120];
            for window in [1, 2, 3, 7, 40, 120] {
                let result = rolling_mean(&values, window);
                for v in &result[window - 1..] {
                    assert_eq!(*v, price, "price={price} window={window}");
                }
            }
        }
    }

    #[test]
    fn matches_direct_window_sum() {
        let values: Vec<f64> = (0..300).map(|i| 50.0 + 7.0 * (i as f64 * 0.11).cos()).collect();
        let result = rolling_mean(&values, 25);
        for i in 24..300 {
            let direct = values[i - 24..=i].iter().sum::<f64>() / 25.0;
            assert_approx(result[i], direct, 1e-9);
        }
    }

    #[test]
    fn run_restarts_after_nan() {
        let values = [1.0, 2.0, f64::NAN, 4.0, 4.0, 4.0, 7.0];
        let result = rolling_mean(&values, 3);
        assert!(result[3].is_nan());
        assert!(result[4].is_nan());
        assert_eq!(result[5], 4.0);
        assert_approx(result[6], 5.0, DEFAULT_EPSILON);
    }

    #[test]
    #[should_panic(expected = "SMA period must be >= 1")]
    fn rejects_zero_period() {
        Sma::new(0);
    }
}
