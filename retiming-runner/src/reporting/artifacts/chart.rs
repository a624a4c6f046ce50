//! Equity chart export (SVG).
//!
//! Strategy equity as a solid line, buy-and-hold as a dashed line, both on
//! one value axis.

use std::fmt::Write;

use super::equity::EquityRow;

const WIDTH: f64 = 960.0;
const HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 50.0;

/// Longer curves are decimated to roughly this many vertices per line.
const MAX_VERTICES: usize = 4000;

const STRATEGY_COLOR: &str = "#1f77b4";
const BENCHMARK_COLOR: &str = "#7f7f7f";

pub fn render_equity_svg(title: &str, rows: &[EquityRow]) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="12">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="24" text-anchor="middle" font-size="16">{}</text>"#,
        WIDTH / 2.0,
        escape(title)
    );

    let finite = rows
        .iter()
        .flat_map(|r| [r.equity, r.benchmark])
        .filter(|v| v.is_finite());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });

    if rows.is_empty() || !lo.is_finite() {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">no data</text>"#,
            WIDTH / 2.0,
            HEIGHT / 2.0
        );
        svg.push_str("</svg>\n");
        return svg;
    }
    let (lo, hi) = if hi - lo < f64::EPSILON {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo, hi)
    };

    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let last = rows.len().saturating_sub(1).max(1) as f64;
    let x = |i: usize| MARGIN_LEFT + plot_w * i as f64 / last;
    let y = |v: f64| MARGIN_TOP + plot_h * (hi - v) / (hi - lo);

    // Axes and value labels.
    let bottom = MARGIN_TOP + plot_h;
    let _ = writeln!(
        svg,
        r#"<polyline points="{MARGIN_LEFT},{MARGIN_TOP} {MARGIN_LEFT},{bottom} {},{bottom}" fill="none" stroke="black"/>"#,
        MARGIN_LEFT + plot_w
    );
    for v in [lo, (lo + hi) / 2.0, hi] {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{:.1}" text-anchor="end">{:.0}</text>"#,
            MARGIN_LEFT - 6.0,
            y(v) + 4.0,
            v
        );
    }
    if let (Some(first), Some(end)) = (rows.first(), rows.last()) {
        let _ = writeln!(
            svg,
            r#"<text x="{MARGIN_LEFT}" y="{}">{}</text>"#,
            bottom + 20.0,
            first.timestamp.format("%Y-%m-%d")
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="end">{}</text>"#,
            MARGIN_LEFT + plot_w,
            bottom + 20.0,
            end.timestamp.format("%Y-%m-%d")
        );
    }

    let stride = rows.len().div_ceil(MAX_VERTICES).max(1);
    let line = |value: fn(&EquityRow) -> f64| {
        let mut points = String::new();
        for (i, row) in rows.iter().enumerate() {
            let keep = i % stride == 0 || i + 1 == rows.len();
            let v = value(row);
            if keep && v.is_finite() {
                let _ = write!(points, "{:.1},{:.1} ", x(i), y(v));
            }
        }
        points
    };

    let _ = writeln!(
        svg,
        r#"<polyline points="{}" fill="none" stroke="{BENCHMARK_COLOR}" stroke-width="1.2" stroke-dasharray="6 4"/>"#,
        line(|r| r.benchmark).trim_end()
    );
    let _ = writeln!(
        svg,
        r#"<polyline points="{}" fill="none" stroke="{STRATEGY_COLOR}" stroke-width="1.5"/>"#,
        line(|r| r.equity).trim_end()
    );

    // Legend.
    let lx = MARGIN_LEFT + 12.0;
    let _ = writeln!(
        svg,
        r#"<line x1="{lx}" y1="{}" x2="{}" y2="{}" stroke="{STRATEGY_COLOR}" stroke-width="2"/><text x="{}" y="{}">strategy</text>"#,
        MARGIN_TOP + 12.0,
        lx + 24.0,
        MARGIN_TOP + 12.0,
        lx + 30.0,
        MARGIN_TOP + 16.0
    );
    let _ = writeln!(
        svg,
        r#"<line x1="{lx}" y1="{}" x2="{}" y2="{}" stroke="{BENCHMARK_COLOR}" stroke-width="2" stroke-dasharray="6 4"/><text x="{}" y="{}">buy and hold</text>"#,
        MARGIN_TOP + 30.0,
        lx + 24.0,
        MARGIN_TOP + 30.0,
        lx + 30.0,
        MARGIN_TOP + 34.0
    );

    svg.push_str("</svg>\n");
    svg
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
