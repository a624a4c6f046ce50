//! Equity curve export (CSV).

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::path::Path;

use retiming_core::domain::PriceSeries;

use crate::runner::BacktestResult;

/// One bar of the exported equity table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityRow {
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub position: i8,
    pub net_value: f64,
    pub equity: f64,
    /// Buy-and-hold equity from the same starting capital.
    pub benchmark: f64,
}

pub fn equity_rows(result: &BacktestResult, series: &PriceSeries) -> Vec<EquityRow> {
    let capital = result.curve.initial_capital;
    let base = series.first().map_or(1.0, |b| b.close);
    series
        .bars()
        .iter()
        .zip(&result.curve.points)
        .zip(&result.positions)
        .map(|((bar, point), &position)| EquityRow {
            timestamp: bar.timestamp,
            close: bar.close,
            position,
            net_value: point.net_value,
            equity: point.equity,
            benchmark: bar.close / base * capital,
        })
        .collect()
}

pub fn write_equity_csv(path: &Path, rows: &[EquityRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create equity CSV {}", path.display()))?;
    writer.write_record(["timestamp", "close", "position", "net_value", "equity", "benchmark"])?;
    for row in rows {
        writer.write_record([
            row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            row.close.to_string(),
            row.position.to_string(),
            format!("{:.8}", row.net_value),
            format!("{:.4}", row.equity),
            format!("{:.4}", row.benchmark),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
