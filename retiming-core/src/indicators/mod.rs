//! Per-bar factor transforms.
//!
//! An indicator maps a price series to one named output column of the same
//! length. Indicators are stateless and never look at bars after `t` when
//! producing the value at `t`.

pub mod sma;

pub use sma::{rolling_mean, Sma};

use crate::domain::PriceSeries;

/// A rolling-window statistic over a price series.
///
/// The first `lookback()` values of the output are `f64::NAN` (warmup).
pub trait Indicator: Send + Sync {
    /// Output column name (e.g. "sma_20").
    fn name(&self) -> &str;

    /// Number of leading bars without a defined value.
    fn lookback(&self) -> usize;

    /// Compute the indicator over the whole series.
    fn compute(&self, series: &PriceSeries) -> Vec<f64>;
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
