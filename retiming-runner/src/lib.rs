//! Retiming Runner: data loading, metrics, single runs, parameter sweeps.
//!
//! This crate builds on `retiming-core` to provide:
//! - CSV loading with encoding fallback, metadata-row detection and
//!   forward-fill of missing values
//! - Performance metrics over a simulated equity curve
//! - The single-run pipeline (rule -> engine -> metrics)
//! - Grid search over the dual-MA crossover on a bounded worker pool
//! - TOML configuration and artifact export

pub mod config;
pub mod data_loader;
pub mod metrics;
pub mod reporting;
pub mod runner;
pub mod sweep;

pub use config::{BacktestConfig, BacktestSettings, ConfigError, SweepConfig, WindowSpec};
pub use data_loader::{load_series, parse_series, LoadError, LoadOptions, LoadedSeries};
pub use metrics::PerformanceReport;
pub use reporting::{ArtifactManager, ArtifactPaths};
pub use runner::{evaluate, run_backtest, BacktestResult, EventCounts, RunError, RunSettings};
pub use sweep::{OptimizationResult, ParamGrid, ParamSweep, SweepFailure, SweepResults};
