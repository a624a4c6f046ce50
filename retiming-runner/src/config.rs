//! Serializable backtest configuration, loaded from TOML.
//!
//! ```toml
//! [data]
//! path = "data/BTC-USDT.csv"
//!
//! [backtest]
//! fee_rate = 0.001
//!
//! [signal]
//! type = "dual_ma"
//! short_window = 80
//! long_window = 500
//!
//! [sweep]
//! short_windows = { start = 10, end = 110, step = 10 }
//! long_windows = [100, 200, 300]
//! ```
//!
//! Every section except `[data]` may be omitted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use retiming_core::engine::{CostModel, EngineConfig};
use retiming_core::signal::SignalConfig;

use crate::data_loader::LoadOptions;
use crate::runner::RunSettings;
use crate::sweep::ParamGrid;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for `run` and `sweep`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BacktestConfig {
    pub data: DataConfig,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    pub path: PathBuf,
    /// Defaults to the file stem.
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default = "default_fallback_encoding")]
    pub fallback_encoding: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            symbol: None,
            fallback_encoding: default_fallback_encoding(),
        }
    }
}

fn default_fallback_encoding() -> String {
    "gbk".into()
}

/// Capital, costs and bar frequency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BacktestSettings {
    pub initial_capital: f64,
    pub fee_rate: f64,
    pub slippage_rate: f64,
    /// 8760 for hourly bars, 365 for daily crypto bars, 252 for daily equities.
    pub periods_per_year: f64,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            fee_rate: 0.001,
            slippage_rate: 0.008,
            periods_per_year: 8760.0,
        }
    }
}

impl BacktestSettings {
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            engine: EngineConfig::new(
                CostModel::new(self.fee_rate, self.slippage_rate),
                self.initial_capital,
            ),
            periods_per_year: self.periods_per_year,
        }
    }
}

/// A window axis: explicit values or a half-open `start..end` range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WindowSpec {
    List(Vec<usize>),
    Range { start: usize, end: usize, step: usize },
}

impl WindowSpec {
    /// Expand to the ordered list of windows. A zero step yields nothing.
    pub fn values(&self) -> Vec<usize> {
        match self {
            WindowSpec::List(values) => values.clone(),
            WindowSpec::Range { step: 0, .. } => Vec::new(),
            WindowSpec::Range { start, end, step } => (*start..*end).step_by(*step).collect(),
        }
    }
}

/// Grid search settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    pub short_windows: WindowSpec,
    pub long_windows: WindowSpec,
    pub stop_loss_fraction: f64,
    pub top_k: usize,
    /// Worker threads; unset means all available cores, 1 means sequential.
    pub workers: Option<usize>,
    pub output: PathBuf,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            short_windows: WindowSpec::Range {
                start: 10,
                end: 110,
                step: 10,
            },
            long_windows: WindowSpec::Range {
                start: 100,
                end: 550,
                step: 50,
            },
            stop_loss_fraction: 0.10,
            top_k: 10,
            workers: None,
            output: PathBuf::from("dual_ma_optimization.csv"),
        }
    }
}

impl SweepConfig {
    pub fn grid(&self) -> ParamGrid {
        ParamGrid::new(
            self.short_windows.values(),
            self.long_windows.values(),
            self.stop_loss_fraction,
        )
    }
}

impl BacktestConfig {
    /// Configuration with defaults everywhere except the data path.
    pub fn for_data(path: impl Into<PathBuf>) -> Self {
        Self {
            data: DataConfig {
                path: path.into(),
                ..DataConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Deterministic content hash of the configuration.
    pub fn run_id(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            symbol: self.data.symbol.clone(),
            fallback_encoding: self.data.fallback_encoding.clone(),
        }
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.data.path.as_os_str().is_empty() {
            return invalid("data.path is required".into());
        }

        let b = &self.backtest;
        if !(b.initial_capital.is_finite() && b.initial_capital > 0.0) {
            return invalid(format!("initial_capital must be > 0, got {}", b.initial_capital));
        }
        if !(b.fee_rate.is_finite() && b.fee_rate >= 0.0) {
            return invalid(format!("fee_rate must be >= 0, got {}", b.fee_rate));
        }
        if !(b.slippage_rate.is_finite() && b.slippage_rate >= 0.0) {
            return invalid(format!("slippage_rate must be >= 0, got {}", b.slippage_rate));
        }
        if !(b.periods_per_year.is_finite() && b.periods_per_year > 0.0) {
            return invalid(format!(
                "periods_per_year must be > 0, got {}",
                b.periods_per_year
            ));
        }

        let s = &self.sweep;
        for (name, spec) in [("short_windows", &s.short_windows), ("long_windows", &s.long_windows)] {
            if let WindowSpec::Range { step: 0, .. } = spec {
                return invalid(format!("sweep.{name} step must be >= 1"));
            }
            if spec.values().is_empty() {
                return invalid(format!("sweep.{name} is empty"));
            }
        }
        if !(0.0..=1.0).contains(&s.stop_loss_fraction) {
            return invalid(format!(
                "sweep.stop_loss_fraction must be in [0, 1], got {}",
                s.stop_loss_fraction
            ));
        }
        if s.top_k == 0 {
            return invalid("sweep.top_k must be >= 1".into());
        }
        if s.workers == Some(0) {
            return invalid("sweep.workers must be >= 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retiming_core::signal::{ClassifierParams, DualMaParams};

    #[test]
    fn minimal_config_uses_defaults() {
        let config = BacktestConfig::from_toml("[data]\npath = \"btc.csv\"\n").unwrap();
        assert_eq!(config.data.path, PathBuf::from("btc.csv"));
        assert_eq!(config.data.fallback_encoding, "gbk");
        assert_eq!(config.backtest, BacktestSettings::default());
        assert_eq!(config.signal, SignalConfig::DualMa(DualMaParams::default()));
        // short=100 with long=100 is the only discarded cell.
        assert_eq!(config.sweep.grid().size(), 10 * 9 - 1);
        config.validate().unwrap();
    }

    #[test]
    fn parses_every_section() {
        let text = r#"
            [data]
            path = "eth.csv"
            symbol = "ETH-USDT"
            fallback_encoding = "gb18030"

            [backtest]
            initial_capital = 5000.0
            fee_rate = 0.0005

            [signal]
            type = "ma_classifier"
            window = 30

            [sweep]
            short_windows = [5, 10]
            long_windows = { start = 20, end = 40, step = 10 }
            top_k = 3
            workers = 2
            output = "out.csv"
        "#;
        let config = BacktestConfig::from_toml(text).unwrap();
        assert_eq!(config.data.symbol.as_deref(), Some("ETH-USDT"));
        assert_eq!(config.backtest.initial_capital, 5000.0);
        assert_eq!(config.backtest.fee_rate, 0.0005);
        assert_eq!(config.backtest.slippage_rate, 0.008);
        assert_eq!(
            config.signal,
            SignalConfig::MaClassifier(ClassifierParams { window: 30 })
        );
        assert_eq!(config.sweep.short_windows.values(), vec![5, 10]);
        assert_eq!(config.sweep.long_windows.values(), vec![20, 30]);
        assert_eq!(config.sweep.workers, Some(2));
        config.validate().unwrap();
    }

    #[test]
    fn partial_signal_section_fills_defaults() {
        let text = "[data]\npath = \"x.csv\"\n[signal]\ntype = \"dual_ma\"\nshort_window = 10\n";
        let config = BacktestConfig::from_toml(text).unwrap();
        match config.signal {
            SignalConfig::DualMa(p) => {
                assert_eq!(p.short_window, 10);
                assert_eq!(p.long_window, 500);
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }

    #[test]
    fn window_range_is_half_open() {
        let spec = WindowSpec::Range {
            start: 100,
            end: 550,
            step: 50,
        };
        assert_eq!(
            spec.values(),
            vec![100, 150, 200, 250, 300, 350, 400, 450, 500]
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = BacktestConfig::for_data("btc.csv");
        config.backtest.initial_capital = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = BacktestConfig::for_data("btc.csv");
        config.backtest.fee_rate = -0.1;
        assert!(config.validate().is_err());

        let mut config = BacktestConfig::for_data("btc.csv");
        config.sweep.short_windows = WindowSpec::Range {
            start: 1,
            end: 10,
            step: 0,
        };
        assert!(config.validate().is_err());

        let mut config = BacktestConfig::for_data("btc.csv");
        config.sweep.long_windows = WindowSpec::List(vec![]);
        assert!(config.validate().is_err());

        let mut config = BacktestConfig::for_data("btc.csv");
        config.sweep.top_k = 0;
        assert!(config.validate().is_err());

        assert!(BacktestConfig::default().validate().is_err());
    }

    #[test]
    fn parse_error_is_reported() {
        assert!(matches!(
            BacktestConfig::from_toml("[data]\npath = 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn run_id_is_deterministic_and_param_sensitive() {
        let a = BacktestConfig::for_data("btc.csv");
        let b = BacktestConfig::for_data("btc.csv");
        assert_eq!(a.run_id().unwrap(), b.run_id().unwrap());

        let mut c = BacktestConfig::for_data("btc.csv");
        c.backtest.fee_rate = 0.002;
        assert_ne!(a.run_id().unwrap(), c.run_id().unwrap());
    }
}
