//! Artifact manager for persisting single-run outputs.

mod chart;
mod equity;
mod report;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use retiming_core::domain::PriceSeries;

use crate::runner::BacktestResult;

pub use chart::render_equity_svg;
pub use equity::{equity_rows, EquityRow};
pub use report::{read_report, RunReport};

/// Artifact paths returned after export.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub report_json: PathBuf,
    pub equity_csv: PathBuf,
    pub equity_svg: PathBuf,
}

/// Manages writing all artifacts for a run.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    output_dir: PathBuf,
    run_id: Option<String>,
}

impl ArtifactManager {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .context("Failed to create artifact output directory")?;
        Ok(Self {
            output_dir,
            run_id: None,
        })
    }

    /// Tag every report written by this manager with `run_id`.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Save the report, the equity table and the equity chart.
    ///
    /// `series` must be the series the result was computed from.
    pub fn save_run(
        &self,
        result: &BacktestResult,
        series: &PriceSeries,
        dataset_hash: &str,
    ) -> Result<ArtifactPaths> {
        anyhow::ensure!(
            series.len() == result.curve.len(),
            "series has {} bars but the equity curve has {}",
            series.len(),
            result.curve.len()
        );

        let report_json = self.output_dir.join("report.json");
        report::write_report_json(
            &report_json,
            result,
            series,
            dataset_hash,
            self.run_id.as_deref(),
        )?;

        let rows = equity_rows(result, series);

        let equity_csv = self.output_dir.join("equity.csv");
        equity::write_equity_csv(&equity_csv, &rows)?;

        let equity_svg = self.output_dir.join("equity.svg");
        let title = format!("{} {} equity", result.symbol, result.strategy);
        let svg = render_equity_svg(&title, &rows);
        std::fs::write(&equity_svg, svg)
            .with_context(|| format!("Failed to write chart {}", equity_svg.display()))?;

        Ok(ArtifactPaths {
            report_json,
            equity_csv,
            equity_svg,
        })
    }
}
