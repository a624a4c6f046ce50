//! Run report export (JSON).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use retiming_core::domain::PriceSeries;
use retiming_core::signal::{SignalConfig, SignalEvent};

use crate::metrics::PerformanceReport;
use crate::runner::{BacktestResult, EventCounts, SCHEMA_VERSION};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u32,
    /// Content hash of the configuration that produced the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub symbol: String,
    pub strategy: String,
    pub signal: SignalConfig,
    #[serde(default)]
    pub warmup_bars: usize,
    pub dataset_hash: String,
    pub bars: usize,
    pub start: Option<chrono::NaiveDateTime>,
    pub end: Option<chrono::NaiveDateTime>,
    pub initial_capital: f64,
    pub report: PerformanceReport,
    pub event_counts: EventCounts,
    pub events: Vec<SignalEvent>,
}

pub fn write_report_json(
    path: &Path,
    result: &BacktestResult,
    series: &PriceSeries,
    dataset_hash: &str,
    run_id: Option<&str>,
) -> Result<()> {
    let report = RunReport {
        schema_version: result.schema_version,
        run_id: run_id.map(str::to_string),
        generated_at: chrono::Utc::now(),
        symbol: result.symbol.clone(),
        strategy: result.strategy.clone(),
        signal: result.signal.clone(),
        warmup_bars: result.warmup_bars,
        dataset_hash: dataset_hash.to_string(),
        bars: series.len(),
        start: series.first().map(|b| b.timestamp),
        end: series.last().map(|b| b.timestamp),
        initial_capital: result.curve.initial_capital,
        report: result.report,
        event_counts: result.event_counts,
        events: result.events.clone(),
    };

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

/// Load a previously written report, rejecting newer schema versions.
pub fn read_report(path: &Path) -> Result<RunReport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report {}", path.display()))?;
    let report: RunReport = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse report {}", path.display()))?;
    anyhow::ensure!(
        report.schema_version <= SCHEMA_VERSION,
        "report schema version {} is newer than supported version {}",
        report.schema_version,
        SCHEMA_VERSION
    );
    Ok(report)
}
