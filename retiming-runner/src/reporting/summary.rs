//! Console rendering of reports and sweep rankings.

use std::fmt::Write;

use crate::metrics::PerformanceReport;
use crate::sweep::OptimizationResult;

/// Labeled, display-formatted metrics in presentation order.
pub fn report_rows(report: &PerformanceReport) -> Vec<(&'static str, String)> {
    vec![
        ("Total Return", percent(report.total_return)),
        ("Annualized Return", percent(report.annualized_return)),
        ("Max Drawdown", percent(report.max_drawdown)),
        ("Sharpe Ratio", format!("{:.2}", report.sharpe_ratio)),
        ("Trade Count", report.trade_count.to_string()),
        ("Win Rate", percent(report.win_rate)),
        ("Final Equity", format!("{:.2}", report.final_equity)),
    ]
}

/// Render the report as aligned `Label: value` lines.
pub fn format_report(report: &PerformanceReport) -> String {
    let rows = report_rows(report);
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0) + 1;
    let mut out = String::new();
    for (label, value) in rows {
        let _ = writeln!(out, "{:<width$} {}", format!("{label}:"), value, width = width);
    }
    out
}

/// Render ranked sweep rows as a fixed-width table.
pub fn format_top_results(rows: &[&OptimizationResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>4}  {:>6}  {:>6}  {:>9}  {:>13}  {:>7}  {:>13}",
        "Rank", "Short", "Long", "Stop", "Total Return", "Sharpe", "Max Drawdown"
    );
    for (i, row) in rows.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>4}  {:>6}  {:>6}  {:>9}  {:>13}  {:>7.2}  {:>13}",
            i + 1,
            row.params.short_window,
            row.params.long_window,
            percent(row.params.stop_loss_fraction),
            percent(row.total_return),
            row.sharpe_ratio,
            percent(row.max_drawdown),
        );
    }
    out
}

fn percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}
