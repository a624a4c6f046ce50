//! Parameter sweep over the dual-MA crossover grid.
//!
//! Every cell is independent: it builds its own rule, threads its own signal
//! state and simulates its own curve against the shared, read-only series.
//! Cells run on a bounded rayon pool; the indexed collect keeps the result
//! table in grid order no matter which worker finished first.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use retiming_core::domain::PriceSeries;
use retiming_core::signal::{DualMaParams, SignalConfig};

use crate::runner::{evaluate, RunSettings};

/// Parameter grid specification.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub short_windows: Vec<usize>,
    pub long_windows: Vec<usize>,
    /// Held fixed across the grid.
    pub stop_loss_fraction: f64,
}

impl ParamGrid {
    pub fn new(short_windows: Vec<usize>, long_windows: Vec<usize>, stop_loss_fraction: f64) -> Self {
        Self {
            short_windows,
            long_windows,
            stop_loss_fraction,
        }
    }

    /// Number of valid (`short < long`) combinations.
    pub fn size(&self) -> usize {
        self.short_windows
            .iter()
            .map(|&s| self.long_windows.iter().filter(|&&l| s < l).count())
            .sum()
    }

    /// All valid combinations, short-major.
    pub fn combinations(&self) -> Vec<DualMaParams> {
        let mut out = Vec::with_capacity(self.size());
        for &short in &self.short_windows {
            for &long in &self.long_windows {
                // The fast window must be strictly shorter.
                if short >= long {
                    continue;
                }
                out.push(DualMaParams {
                    short_window: short,
                    long_window: long,
                    stop_loss_fraction: self.stop_loss_fraction,
                });
            }
        }
        out
    }
}

/// One row of the result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub params: DualMaParams,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

/// A cell whose pipeline failed. Excluded from the table.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepFailure {
    pub params: DualMaParams,
    pub message: String,
}

/// Parameter sweep executor.
pub struct ParamSweep<'a> {
    series: &'a PriceSeries,
    settings: RunSettings,
    workers: usize,
}

impl<'a> ParamSweep<'a> {
    /// A sweep using every available core.
    pub fn new(series: &'a PriceSeries, settings: RunSettings) -> Self {
        let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            series,
            settings,
            workers,
        }
    }

    /// Bound the worker pool. `1` runs the cells sequentially on the caller's thread.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run(&self, grid: &ParamGrid) -> Result<SweepResults> {
        self.run_with_progress(grid, |_, _| {})
    }

    /// Executes the sweep, calling `progress(finished, total)` after each cell.
    pub fn run_with_progress<F>(&self, grid: &ParamGrid, progress: F) -> Result<SweepResults>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        let combos = grid.combinations();
        let total = combos.len();
        let finished = AtomicUsize::new(0);
        info!(cells = total, workers = self.workers, "starting parameter sweep");

        let eval = |params: &DualMaParams| {
            let outcome = self.evaluate_cell(params);
            let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(done, total, "sweep progress");
            progress(done, total);
            outcome
        };

        let outcomes: Vec<Result<OptimizationResult, SweepFailure>> = if self.workers == 1 {
            combos.iter().map(eval).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .context("failed to build sweep worker pool")?;
            pool.install(|| combos.par_iter().map(eval).collect())
        };

        let mut rows = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(row) => rows.push(row),
                Err(failure) => failures.push(failure),
            }
        }
        info!(
            evaluated = rows.len(),
            failed = failures.len(),
            "parameter sweep complete"
        );
        Ok(SweepResults { rows, failures })
    }

    fn evaluate_cell(&self, params: &DualMaParams) -> Result<OptimizationResult, SweepFailure> {
        let signal = SignalConfig::DualMa(params.clone());
        match evaluate(self.series, &signal, &self.settings) {
            Ok(report) => Ok(OptimizationResult {
                params: params.clone(),
                total_return: report.total_return,
                sharpe_ratio: report.sharpe_ratio,
                max_drawdown: report.max_drawdown,
            }),
            Err(e) => {
                warn!(
                    short_window = params.short_window,
                    long_window = params.long_window,
                    stop_loss_fraction = params.stop_loss_fraction,
                    error = %e,
                    "grid cell failed, skipping"
                );
                Err(SweepFailure {
                    params: params.clone(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Results from a parameter sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepResults {
    /// Successful cells, in grid order.
    rows: Vec<OptimizationResult>,
    failures: Vec<SweepFailure>,
}

impl SweepResults {
    /// Returns all successful rows in grid order.
    pub fn all(&self) -> &[OptimizationResult] {
        &self.rows
    }

    pub fn failures(&self) -> &[SweepFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows sorted by Sharpe ratio, best first. Ties keep grid order.
    pub fn ranked(&self) -> Vec<&OptimizationResult> {
        let mut sorted: Vec<&OptimizationResult> = self.rows.iter().collect();
        sorted.sort_by(|a, b| b.sharpe_ratio.total_cmp(&a.sharpe_ratio));
        sorted
    }

    pub fn top_k(&self, k: usize) -> Vec<&OptimizationResult> {
        let mut ranked = self.ranked();
        ranked.truncate(k);
        ranked
    }

    pub fn best(&self) -> Option<&OptimizationResult> {
        self.ranked().into_iter().next()
    }

    /// Persist the complete table, in grid order, as CSV.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writer.write_record([
            "short_window",
            "long_window",
            "stop_loss_fraction",
            "total_return",
            "sharpe_ratio",
            "max_drawdown",
        ])?;
        for row in &self.rows {
            writer.write_record([
                row.params.short_window.to_string(),
                row.params.long_window.to_string(),
                row.params.stop_loss_fraction.to_string(),
                row.total_return.to_string(),
                row.sharpe_ratio.to_string(),
                row.max_drawdown.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}
