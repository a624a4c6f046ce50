//! Performance metrics: pure functions over an equity curve.
//!
//! Every metric is a pure function: curve columns in, scalar out. Division
//! by a zero (or near-zero) denominator yields 0 rather than NaN/inf.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use retiming_core::engine::EquityCurve;

/// Standard deviations below this count as zero variance.
const VARIANCE_EPSILON: f64 = 1e-15;

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    pub final_equity: f64,
}

impl PerformanceReport {
    /// Compute all metrics from a simulated curve.
    ///
    /// `periods_per_year` reflects the bar frequency (8760 for hourly bars).
    pub fn compute(curve: &EquityCurve, periods_per_year: f64) -> Self {
        let (first, last) = match (curve.first(), curve.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Self {
                    total_return: 0.0,
                    annualized_return: 0.0,
                    max_drawdown: 0.0,
                    sharpe_ratio: 0.0,
                    trade_count: 0,
                    win_rate: 0.0,
                    final_equity: curve.initial_capital,
                }
            }
        };

        let net_values = curve.net_values();
        let net_returns = curve.net_returns();
        let lagged = curve.lagged_positions();
        let days = elapsed_days(first.timestamp, last.timestamp);

        Self {
            total_return: total_return(&net_values),
            annualized_return: annualized_return(last.net_value, days),
            max_drawdown: max_drawdown(&net_values),
            sharpe_ratio: sharpe_ratio(&net_returns, periods_per_year),
            trade_count: trade_count(&lagged),
            win_rate: win_rate(&lagged, &net_returns),
            final_equity: last.equity,
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction of the starting net value of 1.
pub fn total_return(net_values: &[f64]) -> f64 {
    match net_values.last() {
        Some(&last) if last.is_finite() => last - 1.0,
        _ => 0.0,
    }
}

/// Whole days between two timestamps (truncated toward zero).
pub fn elapsed_days(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    (end - start).num_days()
}

/// Compound annual growth of the final net value over `days`.
///
/// Returns 0 for a zero-length span and -1 once the account is wiped out
/// (a fractional power of a non-positive value is undefined).
pub fn annualized_return(final_net_value: f64, days: i64) -> f64 {
    if days <= 0 || !final_net_value.is_finite() {
        return 0.0;
    }
    if final_net_value <= 0.0 {
        return -1.0;
    }
    let result = final_net_value.powf(365.0 / days as f64) - 1.0;
    if result.is_finite() {
        result
    } else {
        0.0
    }
}

/// Maximum drawdown as a non-positive fraction (e.g. -0.25 = 25% drawdown).
///
/// Exactly 0 when the series never falls below its running peak.
pub fn max_drawdown(net_values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in net_values {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let dd = (value - peak) / peak;
            if dd < worst {
                worst = dd;
            }
        }
    }
    worst
}

/// Annualized Sharpe ratio of per-bar net returns (zero risk-free rate).
pub fn sharpe_ratio(net_returns: &[f64], periods_per_year: f64) -> f64 {
    if net_returns.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let mean = mean(net_returns);
    let std = std_dev(net_returns, mean);
    if std < VARIANCE_EPSILON {
        return 0.0;
    }
    let sharpe = periods_per_year.sqrt() * mean / std;
    if sharpe.is_finite() {
        sharpe
    } else {
        0.0
    }
}

/// Number of bars where the lagged position differs from the previous bar.
pub fn trade_count(lagged_positions: &[i8]) -> usize {
    lagged_positions.windows(2).filter(|w| w[0] != w[1]).count()
}

/// Fraction of exposed bars (lagged position non-zero) with a positive net return.
pub fn win_rate(lagged_positions: &[i8], net_returns: &[f64]) -> f64 {
    let (exposed, wins) = lagged_positions
        .iter()
        .zip(net_returns)
        .filter(|(&p, _)| p != 0)
        .fold((0usize, 0usize), |(exposed, wins), (_, &r)| {
            (exposed + 1, wins + usize::from(r > 0.0))
        });
    if exposed == 0 {
        0.0
    } else {
        wins as f64 / exposed as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use retiming_core::domain::{PositionSeries, PriceSeries};
    use retiming_core::engine::{simulate, CostModel, EngineConfig};

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    // ── Total return ──

    #[test]
    fn total_return_from_net_value() {
        assert!((total_return(&[1.0, 1.1, 1.25]) - 0.25).abs() < 1e-12);
        assert_eq!(total_return(&[]), 0.0);
    }

    // ── Annualized return ──

    #[test]
    fn annualized_return_over_one_year() {
        assert!((annualized_return(1.21, 365) - 0.21).abs() < 1e-12);
        let two_years = annualized_return(1.21, 730);
        assert!((two_years - 0.1).abs() < 1e-12);
    }

    #[test]
    fn annualized_return_guards() {
        assert_eq!(annualized_return(1.5, 0), 0.0);
        assert_eq!(annualized_return(0.0, 100), -1.0);
        assert_eq!(annualized_return(f64::NAN, 100), 0.0);
    }

    #[test]
    fn elapsed_days_truncates_partial_days() {
        let start = ts(1);
        let end = ts(3) + chrono::Duration::hours(23);
        assert_eq!(elapsed_days(start, end), 2);
    }

    // ── Max drawdown ──

    #[test]
    fn max_drawdown_known_path() {
        let dd = max_drawdown(&[1.0, 1.2, 0.9, 1.1, 1.5, 1.2]);
        assert!((dd - (0.9 - 1.2) / 1.2).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_zero_when_non_decreasing() {
        assert_eq!(max_drawdown(&[1.0, 1.0, 1.1, 1.1, 2.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    // ── Sharpe ──

    #[test]
    fn sharpe_zero_variance_is_zero() {
        assert_eq!(sharpe_ratio(&[0.0; 50], 8760.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01; 50], 8760.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01], 8760.0), 0.0);
    }

    #[test]
    fn sharpe_matches_hand_computation() {
        let returns: [f64; 4] = [0.01, -0.005, 0.02, 0.0];
        let mean = 0.025 / 4.0;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 3.0;
        let expected = 252f64.sqrt() * mean / var.sqrt();
        assert!((sharpe_ratio(&returns, 252.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn sharpe_sign_follows_mean() {
        assert!(sharpe_ratio(&[0.01, 0.02, 0.015, 0.005], 8760.0) > 0.0);
        assert!(sharpe_ratio(&[-0.01, -0.02, -0.015, -0.005], 8760.0) < 0.0);
    }

    // ── Trades and win rate ──

    #[test]
    fn trade_count_counts_lagged_changes() {
        assert_eq!(trade_count(&[0, 0, 1, 1, 0, 1]), 3);
        assert_eq!(trade_count(&[0, 0, 0]), 0);
        assert_eq!(trade_count(&[]), 0);
    }

    #[test]
    fn win_rate_over_exposed_bars_only() {
        let lagged = [0, 1, 1, 1, 0];
        let returns = [0.5, 0.01, -0.02, 0.03, 0.9];
        assert!((win_rate(&lagged, &returns) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(win_rate(&[0, 0], &[0.1, 0.1]), 0.0);
    }

    // ── Full report ──

    #[test]
    fn flat_prices_report_zeros() {
        let series =
            PriceSeries::from_closes("FLAT", ts(1), chrono::Duration::hours(1), &[100.0; 48])
                .unwrap();
        let mut values = vec![0i8; 48];
        values[10..30].iter_mut().for_each(|v| *v = 1);
        let positions = PositionSeries::new(values).unwrap();
        let config = EngineConfig::new(CostModel::zero(), 10_000.0);
        let curve = simulate(&series, &positions, &config).unwrap();

        let report = PerformanceReport::compute(&curve, 8760.0);
        assert_eq!(report.total_return, 0.0);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.max_drawdown, 0.0);
        assert_eq!(report.win_rate, 0.0);
        assert_eq!(report.final_equity, 10_000.0);
        assert_eq!(report.trade_count, 2);
    }

    #[test]
    fn report_final_equity_tracks_curve() {
        let series = PriceSeries::from_closes(
            "UP",
            ts(1),
            chrono::Duration::days(1),
            &[100.0, 110.0, 121.0],
        )
        .unwrap();
        let positions = PositionSeries::new(vec![1, 1, 1]).unwrap();
        let config = EngineConfig::new(CostModel::zero(), 1_000.0);
        let curve = simulate(&series, &positions, &config).unwrap();
        let report = PerformanceReport::compute(&curve, 365.0);

        // Bar 0 is flat by lag, so the run captures +10% twice.
        assert!((report.total_return - 0.21).abs() < 1e-9);
        assert!((report.final_equity - 1_210.0).abs() < 1e-6);
        assert_eq!(report.trade_count, 1);
        assert_eq!(report.win_rate, 1.0);
    }
}
