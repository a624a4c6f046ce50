//! Price-series loading from delimited text exports.
//!
//! Loading policy:
//! 1. Read the source; a missing or unreadable file is `SourceNotFound`
//! 2. Decode as UTF-8; on failure retry once with the fallback encoding
//!    (GBK by default), then give up with `Decode`
//! 3. Locate the header: the first line, or the second when the first is a
//!    metadata row. The required field set must be present (`Schema`)
//! 4. Parse timestamps, stable-sort ascending, keep the *last* row for each
//!    duplicated timestamp
//! 5. Forward-fill null numeric fields from the previous bar. A field null on
//!    the first bar stays NaN and is reported as a warning

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use encoding_rs::Encoding;
use retiming_core::domain::{PriceBar, PriceSeries, SeriesError};
use thiserror::Error;
use tracing::{info, warn};

/// Columns every source must provide, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

/// Accepted alternate header for the timestamp column.
pub const TIMESTAMP_ALIAS: &str = "candle_begin_time";

const PRIMARY_ENCODING: &str = "UTF-8";

const TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("source not found: {path}: {source}")]
    SourceNotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("cannot decode {path} as {primary} or {fallback}")]
    Decode {
        path: PathBuf,
        primary: &'static str,
        fallback: &'static str,
    },

    #[error("unknown fallback encoding '{0}'")]
    UnknownEncoding(String),

    #[error("line {line}: cannot parse timestamp '{value}'")]
    InvalidTimestamp { line: usize, value: String },

    #[error("line {line}: column '{column}' is not numeric ('{value}')")]
    InvalidNumber {
        line: usize,
        column: &'static str,
        value: String,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no data rows in {0}")]
    Empty(PathBuf),

    #[error("series error: {0}")]
    Series(#[from] SeriesError),
}

/// Options controlling how a source is read.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Symbol attached to the series. Defaults to the file stem.
    pub symbol: Option<String>,
    /// WHATWG label of the encoding tried after UTF-8 fails.
    pub fallback_encoding: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            symbol: None,
            fallback_encoding: "gbk".into(),
        }
    }
}

/// A loaded series plus provenance and data-quality notes.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub series: PriceSeries,
    /// Encoding that decoded the source ("UTF-8" or the fallback's name).
    pub encoding: &'static str,
    /// True when a leading metadata row was skipped.
    pub skipped_metadata_row: bool,
    /// Rows removed by the keep-last duplicate policy.
    pub duplicates_dropped: usize,
    /// Fields that are null on the first bar and could not be forward-filled.
    pub leading_nulls: Vec<&'static str>,
    /// Bars that still carry a NaN field after forward-fill.
    pub void_bars: usize,
    pub warnings: Vec<String>,
    /// BLAKE3 hash over every bar value.
    pub dataset_hash: String,
}

/// Load a price series from a delimited text file.
pub fn load_series(path: &Path, opts: &LoadOptions) -> Result<LoadedSeries, LoadError> {
    let fallback = Encoding::for_label(opts.fallback_encoding.as_bytes())
        .ok_or_else(|| LoadError::UnknownEncoding(opts.fallback_encoding.clone()))?;

    let bytes = std::fs::read(path).map_err(|source| LoadError::SourceNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    let (text, encoding) = decode(&bytes, fallback, path)?;

    let symbol = opts.symbol.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let mut loaded = parse_series(&text, &symbol).map_err(|e| match e {
        LoadError::Empty(_) => LoadError::Empty(path.to_path_buf()),
        other => other,
    })?;
    loaded.encoding = encoding;

    if let (Some(first), Some(last)) = (loaded.series.first(), loaded.series.last()) {
        info!(
            path = %path.display(),
            encoding,
            rows = loaded.series.len(),
            start = %first.timestamp,
            end = %last.timestamp,
            "loaded price series"
        );
    }
    Ok(loaded)
}

/// Parse already-decoded text into a series.
pub fn parse_series(text: &str, symbol: &str) -> Result<LoadedSeries, LoadError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let skip_metadata = locate_header(text)?;
    let body = if skip_metadata {
        text.split_once('\n').map_or("", |(_, rest)| rest)
    } else {
        text
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let headers = reader.headers()?.clone();
    let columns = ColumnIndex::resolve(&headers)?;

    // Line numbers are 1-based and count the header and any metadata row.
    let first_data_line = if skip_metadata { 3 } else { 2 };
    let mut bars = Vec::new();
    for (i, record) in reader.records().enumerate() {
        bars.push(columns.parse_row(&record?, first_data_line + i)?);
    }
    if bars.is_empty() {
        return Err(LoadError::Empty(PathBuf::from(symbol)));
    }

    let mut warnings = Vec::new();
    let duplicates_dropped = sort_and_dedupe(&mut bars);
    if duplicates_dropped > 0 {
        warn!(duplicates_dropped, "duplicate timestamps resolved keep-last");
        warnings.push(format!(
            "{duplicates_dropped} duplicate timestamp row(s) dropped (last occurrence kept)"
        ));
    }

    let leading_nulls = forward_fill(&mut bars);
    for field in &leading_nulls {
        warn!(field, "field is null on the first bar and cannot be forward-filled");
        warnings.push(format!("'{field}' is null on the first bar"));
    }
    let void_bars = bars.iter().filter(|bar| bar.is_void()).count();
    if void_bars > 0 {
        warn!(void_bars, "bars still contain null fields after forward-fill");
    }

    let series = PriceSeries::new(symbol, bars)?;
    let dataset_hash = dataset_hash(&series);
    Ok(LoadedSeries {
        series,
        encoding: PRIMARY_ENCODING,
        skipped_metadata_row: skip_metadata,
        duplicates_dropped,
        leading_nulls,
        void_bars,
        warnings,
        dataset_hash,
    })
}

fn decode<'a>(
    bytes: &'a [u8],
    fallback: &'static Encoding,
    path: &Path,
) -> Result<(Cow<'a, str>, &'static str), LoadError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok((Cow::Borrowed(text), PRIMARY_ENCODING)),
        Err(_) => {
            warn!(
                path = %path.display(),
                fallback = fallback.name(),
                "UTF-8 decode failed, retrying with fallback encoding"
            );
            fallback
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| (text, fallback.name()))
                .ok_or_else(|| LoadError::Decode {
                    path: path.to_path_buf(),
                    primary: PRIMARY_ENCODING,
                    fallback: fallback.name(),
                })
        }
    }
}

/// Returns true when the header is on the second line.
fn locate_header(text: &str) -> Result<bool, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let mut candidates = Vec::with_capacity(2);
    for record in reader.records().take(2) {
        candidates.push(missing_columns(&record?));
    }

    match candidates.as_slice() {
        [] => Err(LoadError::Schema {
            missing: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }),
        [first, ..] if first.is_empty() => Ok(false),
        [_, second] if second.is_empty() => Ok(true),
        [first] => Err(LoadError::Schema {
            missing: first.clone(),
        }),
        [first, second, ..] => Err(LoadError::Schema {
            missing: if second.len() < first.len() {
                second.clone()
            } else {
                first.clone()
            },
        }),
    }
}

fn missing_columns(header: &StringRecord) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|&&col| find_column(header, col).is_none())
        .map(|c| c.to_string())
        .collect()
}

fn find_column(header: &StringRecord, name: &str) -> Option<usize> {
    header.iter().position(|h| {
        h.eq_ignore_ascii_case(name) || (name == "timestamp" && h.eq_ignore_ascii_case(TIMESTAMP_ALIAS))
    })
}

/// Positions of the required columns within a header record.
struct ColumnIndex {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl ColumnIndex {
    fn resolve(header: &StringRecord) -> Result<Self, LoadError> {
        let find = |name| find_column(header, name);
        match (
            find("timestamp"),
            find("open"),
            find("high"),
            find("low"),
            find("close"),
            find("volume"),
        ) {
            (Some(timestamp), Some(open), Some(high), Some(low), Some(close), Some(volume)) => {
                Ok(Self {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume,
                })
            }
            _ => Err(LoadError::Schema {
                missing: missing_columns(header),
            }),
        }
    }

    fn parse_row(&self, record: &StringRecord, line: usize) -> Result<PriceBar, LoadError> {
        let raw_ts = record.get(self.timestamp).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| LoadError::InvalidTimestamp {
            line,
            value: raw_ts.to_string(),
        })?;
        let number = |idx: usize, column: &'static str| {
            let raw = record.get(idx).unwrap_or("");
            parse_number(raw).ok_or_else(|| LoadError::InvalidNumber {
                line,
                column,
                value: raw.to_string(),
            })
        };

        Ok(PriceBar {
            timestamp,
            open: number(self.open, "open")?,
            high: number(self.high, "high")?,
            low: number(self.low, "low")?,
            close: number(self.close, "close")?,
            volume: number(self.volume, "volume")?,
        })
    }
}

/// Parse a timestamp in any of the accepted layouts.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a numeric cell. Empty cells and null literals become NaN.
fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty()
        || ["nan", "null", "none", "na"]
            .iter()
            .any(|n| raw.eq_ignore_ascii_case(n))
    {
        return Some(f64::NAN);
    }
    raw.parse::<f64>().ok()
}

/// Stable sort by timestamp, then keep the last row of each duplicate run.
/// Returns the number of rows dropped.
fn sort_and_dedupe(bars: &mut Vec<PriceBar>) -> usize {
    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    let mut out: Vec<PriceBar> = Vec::with_capacity(before);
    for bar in bars.drain(..) {
        match out.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => out.push(bar),
        }
    }
    *bars = out;
    before - bars.len()
}

/// Forward-fill NaN fields. Returns the fields that are NaN on the first bar.
fn forward_fill(bars: &mut [PriceBar]) -> Vec<&'static str> {
    fn fill(bars: &mut [PriceBar], field: fn(&mut PriceBar) -> &mut f64) {
        let mut last_valid: Option<f64> = None;
        for bar in bars.iter_mut() {
            let value = field(bar);
            if value.is_nan() {
                if let Some(v) = last_valid {
                    *value = v;
                }
            } else {
                last_valid = Some(*value);
            }
        }
    }

    let leading = match bars.first() {
        Some(first) => [
            ("open", first.open),
            ("high", first.high),
            ("low", first.low),
            ("close", first.close),
            ("volume", first.volume),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_nan())
        .map(|(name, _)| name)
        .collect(),
        None => Vec::new(),
    };

    fill(bars, |b| &mut b.open);
    fill(bars, |b| &mut b.high);
    fill(bars, |b| &mut b.low);
    fill(bars, |b| &mut b.close);
    fill(bars, |b| &mut b.volume);
    leading
}

/// Deterministic BLAKE3 hash over symbol, timestamps and OHLCV values.
fn dataset_hash(series: &PriceSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(series.symbol().as_bytes());
    for bar in series.bars() {
        hasher.update(bar.timestamp.to_string().as_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
