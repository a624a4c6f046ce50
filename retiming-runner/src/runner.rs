//! Backtest runner: wires together signal rules, the equity engine, and metrics.
//!
//! Two entry points:
//! - `run_backtest()`: full result with curve and events. Used by `retiming run`.
//! - `evaluate()`: report only, no curve retained. Used per grid cell by the sweep.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use retiming_core::domain::PriceSeries;
use retiming_core::engine::{simulate, EngineConfig, EngineError, EquityCurve};
use retiming_core::signal::{
    PositionRule, SignalConfig, SignalError, SignalEvent, SignalEventKind, SignalOutput,
};

use crate::metrics::PerformanceReport;

/// Errors from one pipeline run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Engine and metric settings shared by every run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub engine: EngineConfig,
    pub periods_per_year: f64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            periods_per_year: 8760.0,
        }
    }
}

/// How often each kind of state change fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub entries: usize,
    pub crossover_exits: usize,
    pub stop_loss_exits: usize,
}

impl EventCounts {
    pub fn from_output(output: &SignalOutput) -> Self {
        Self {
            entries: output.count(SignalEventKind::Entry),
            crossover_exits: output.count(SignalEventKind::CrossoverExit),
            stop_loss_exits: output.count(SignalEventKind::StopLoss),
        }
    }
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbol: String,
    pub strategy: String,
    pub signal: SignalConfig,
    /// Bars the rule needs before it can leave the flat state.
    #[serde(default)]
    pub warmup_bars: usize,
    pub report: PerformanceReport,
    pub event_counts: EventCounts,
    pub events: Vec<SignalEvent>,
    pub positions: Vec<i8>,
    pub curve: EquityCurve,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run one rule over `series` and keep everything needed for reporting.
pub fn run_backtest(
    series: &PriceSeries,
    signal: &SignalConfig,
    settings: &RunSettings,
) -> Result<BacktestResult, RunError> {
    let rule = signal.build()?;
    let (output, curve, report) = run_rule(series, rule.as_ref(), settings)?;
    debug!(
        strategy = rule.name(),
        bars = series.len(),
        warmup = rule.warmup_bars(),
        exposed = output.positions.exposed_bars(),
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        symbol: series.symbol().to_string(),
        strategy: rule.name().to_string(),
        signal: signal.clone(),
        warmup_bars: rule.warmup_bars(),
        report,
        event_counts: EventCounts::from_output(&output),
        positions: output.positions.values().to_vec(),
        events: output.events,
        curve,
    })
}

/// Run one rule and return only its report.
pub fn evaluate(
    series: &PriceSeries,
    signal: &SignalConfig,
    settings: &RunSettings,
) -> Result<PerformanceReport, RunError> {
    let rule = signal.build()?;
    let (_, _, report) = run_rule(series, rule.as_ref(), settings)?;
    Ok(report)
}

/// Signal generation, then simulation, then metrics.
pub fn run_rule(
    series: &PriceSeries,
    rule: &dyn PositionRule,
    settings: &RunSettings,
) -> Result<(SignalOutput, EquityCurve, PerformanceReport), RunError> {
    let output = rule.generate(series)?;
    let curve = simulate(series, &output.positions, &settings.engine)?;
    let report = PerformanceReport::compute(&curve, settings.periods_per_year);
    Ok((output, curve, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use retiming_core::signal::{ClassifierParams, DualMaParams};

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        PriceSeries::from_closes("TEST", start, Duration::hours(1), closes).unwrap()
    }

    fn dual_ma(short: usize, long: usize) -> SignalConfig {
        SignalConfig::DualMa(DualMaParams {
            short_window: short,
            long_window: long,
            stop_loss_fraction: 0.10,
        })
    }

    #[test]
    fn flat_series_produces_no_trades() {
        let s = series(&[100.0; 200]);
        let result = run_backtest(&s, &dual_ma(5, 20), &RunSettings::default()).unwrap();
        assert_eq!(result.report.total_return, 0.0);
        assert_eq!(result.report.sharpe_ratio, 0.0);
        assert_eq!(result.report.trade_count, 0);
        assert_eq!(result.event_counts, EventCounts::default());
        assert_eq!(result.report.final_equity, 10_000.0);
    }

    #[test]
    fn rising_series_enters_once() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let result = run_backtest(&series(&closes), &dual_ma(5, 20), &RunSettings::default())
            .unwrap();
        assert_eq!(result.event_counts.entries, 1);
        assert_eq!(result.event_counts.stop_loss_exits, 0);
        assert_eq!(result.strategy, "dual_ma");
        assert_eq!(result.warmup_bars, 20);
        assert_eq!(result.curve.len(), 100);
        assert_eq!(result.positions.len(), 100);
        assert!(result.report.total_return > 0.0);
    }

    #[test]
    fn evaluate_matches_full_run() {
        let closes: Vec<f64> = (0..150)
            .map(|i| 100.0 + 10.0 * (i as f64 / 9.0).sin())
            .collect();
        let s = series(&closes);
        let settings = RunSettings::default();
        let full = run_backtest(&s, &dual_ma(3, 12), &settings).unwrap();
        let report = evaluate(&s, &dual_ma(3, 12), &settings).unwrap();
        assert_eq!(full.report, report);
    }

    #[test]
    fn classifier_runs_through_pipeline() {
        let closes: Vec<f64> = (0..60).map(|i| 50.0 + (i % 7) as f64).collect();
        let signal = SignalConfig::MaClassifier(ClassifierParams { window: 5 });
        let result = run_backtest(&series(&closes), &signal, &RunSettings::default()).unwrap();
        assert_eq!(result.strategy, "ma_classifier");
        assert_eq!(result.warmup_bars, 5);
        assert!(result.events.is_empty());
    }

    #[test]
    fn insufficient_history_is_a_signal_error() {
        let s = series(&[100.0; 10]);
        assert!(matches!(
            run_backtest(&s, &dual_ma(5, 20), &RunSettings::default()),
            Err(RunError::Signal(SignalError::InsufficientHistory { .. }))
        ));
    }

    #[test]
    fn invalid_params_are_a_signal_error() {
        let s = series(&[100.0; 50]);
        assert!(matches!(
            evaluate(&s, &dual_ma(20, 5), &RunSettings::default()),
            Err(RunError::Signal(SignalError::InvalidParameter(_)))
        ));
    }

    #[test]
    fn non_positive_close_is_an_engine_error() {
        let mut closes = vec![100.0; 30];
        closes[15] = 0.0;
        let signal = SignalConfig::MaClassifier(ClassifierParams { window: 3 });
        assert!(matches!(
            evaluate(&series(&closes), &signal, &RunSettings::default()),
            Err(RunError::Engine(EngineError::InvalidPrice { index: 15, .. }))
        ));
    }
}
