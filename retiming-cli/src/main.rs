//! Retiming CLI: single backtests and dual-MA parameter sweeps.
//!
//! Commands:
//! - `run`: load a CSV, run one rule, print the report and write artifacts
//! - `sweep`: grid-search the dual-MA crossover and persist the result table
//!
//! Both read an optional TOML config; command-line flags override it.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use retiming_core::signal::{ClassifierParams, DualMaParams, SignalConfig};
use retiming_runner::config::WindowSpec;
use retiming_runner::reporting::{format_report, format_top_results, ArtifactManager};
use retiming_runner::{load_series, run_backtest, BacktestConfig, LoadedSeries, ParamSweep};

#[derive(Parser)]
#[command(
    name = "retiming",
    about = "Retiming: dual moving-average backtester and parameter sweep"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest and write report.json, equity.csv and equity.svg.
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// Short moving-average window.
        #[arg(long)]
        short: Option<usize>,

        /// Long moving-average window.
        #[arg(long)]
        long: Option<usize>,

        /// Stop-loss as a fraction of the entry price (0.10 = 10%).
        #[arg(long)]
        stop_loss: Option<f64>,

        /// Use the single-MA classifier with this window instead of the crossover.
        #[arg(long, conflicts_with_all = ["short", "long", "stop_loss"])]
        classifier_window: Option<usize>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print the report without writing artifacts.
        #[arg(long, default_value_t = false)]
        no_artifacts: bool,
    },
    /// Grid-search short/long windows and write the full result table as CSV.
    Sweep {
        #[command(flatten)]
        common: CommonArgs,

        /// Short windows, comma-separated (e.g. 10,20,30).
        #[arg(long, value_delimiter = ',')]
        short: Option<Vec<usize>>,

        /// Long windows, comma-separated (e.g. 100,200,300).
        #[arg(long, value_delimiter = ',')]
        long: Option<Vec<usize>>,

        /// Stop-loss fraction held fixed across the grid.
        #[arg(long)]
        stop_loss: Option<f64>,

        /// Worker threads. 1 runs sequentially.
        #[arg(long)]
        workers: Option<usize>,

        /// Number of top rows to print.
        #[arg(long)]
        top_k: Option<usize>,

        /// Output CSV path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Flags shared by both commands.
#[derive(Args)]
struct CommonArgs {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the price CSV (overrides [data].path).
    #[arg(long)]
    data: Option<PathBuf>,

    /// Symbol label (defaults to the CSV file stem).
    #[arg(long)]
    symbol: Option<String>,

    /// Starting capital.
    #[arg(long)]
    capital: Option<f64>,

    /// Fee rate per unit of position change.
    #[arg(long)]
    fee_rate: Option<f64>,

    /// Slippage rate per unit of position change.
    #[arg(long)]
    slippage_rate: Option<f64>,

    /// Bars per year for Sharpe annualization (8760 for hourly bars).
    #[arg(long)]
    periods_per_year: Option<f64>,
}

impl CommonArgs {
    fn resolve(&self) -> Result<BacktestConfig> {
        let mut config = match &self.config {
            Some(path) => BacktestConfig::from_file(path)?,
            None => BacktestConfig::default(),
        };
        if let Some(data) = &self.data {
            config.data.path = data.clone();
        }
        if let Some(symbol) = &self.symbol {
            config.data.symbol = Some(symbol.clone());
        }
        let b = &mut config.backtest;
        if let Some(v) = self.capital {
            b.initial_capital = v;
        }
        if let Some(v) = self.fee_rate {
            b.fee_rate = v;
        }
        if let Some(v) = self.slippage_rate {
            b.slippage_rate = v;
        }
        if let Some(v) = self.periods_per_year {
            b.periods_per_year = v;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            common,
            short,
            long,
            stop_loss,
            classifier_window,
            output_dir,
            no_artifacts,
        } => {
            let mut config = common.resolve()?;
            if let Some(window) = classifier_window {
                config.signal = SignalConfig::MaClassifier(ClassifierParams { window });
            } else if short.is_some() || long.is_some() || stop_loss.is_some() {
                let mut params = match &config.signal {
                    SignalConfig::DualMa(p) => p.clone(),
                    SignalConfig::MaClassifier(_) => DualMaParams::default(),
                };
                if let Some(v) = short {
                    params.short_window = v;
                }
                if let Some(v) = long {
                    params.long_window = v;
                }
                if let Some(v) = stop_loss {
                    params.stop_loss_fraction = v;
                }
                config.signal = SignalConfig::DualMa(params);
            }
            config.validate()?;
            cmd_run(&config, output_dir, no_artifacts)
        }
        Commands::Sweep {
            common,
            short,
            long,
            stop_loss,
            workers,
            top_k,
            output,
        } => {
            let mut config = common.resolve()?;
            let s = &mut config.sweep;
            if let Some(values) = short {
                s.short_windows = WindowSpec::List(values);
            }
            if let Some(values) = long {
                s.long_windows = WindowSpec::List(values);
            }
            if let Some(v) = stop_loss {
                s.stop_loss_fraction = v;
            }
            if workers.is_some() {
                s.workers = workers;
            }
            if let Some(v) = top_k {
                s.top_k = v;
            }
            if let Some(path) = output {
                s.output = path;
            }
            config.validate()?;
            cmd_sweep(&config)
        }
    }
}

fn setup_logging() {
    // RUST_LOG overrides the default level. Logs go to stderr so the report
    // on stdout stays clean.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load(config: &BacktestConfig) -> Result<LoadedSeries> {
    let loaded = load_series(&config.data.path, &config.load_options())
        .with_context(|| format!("failed to load {}", config.data.path.display()))?;
    info!(
        symbol = loaded.series.symbol(),
        bars = loaded.series.len(),
        dataset_hash = %loaded.dataset_hash,
        "data ready"
    );
    Ok(loaded)
}

fn cmd_run(config: &BacktestConfig, output_dir: PathBuf, no_artifacts: bool) -> Result<()> {
    let run_id = config.run_id().context("failed to hash configuration")?;
    info!(run_id = %run_id, "starting backtest");
    let loaded = load(config)?;
    let settings = config.backtest.run_settings();
    let result = run_backtest(&loaded.series, &config.signal, &settings)
        .context("backtest failed")?;

    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:   {}", result.symbol);
    if let (Some(first), Some(last)) = (loaded.series.first(), loaded.series.last()) {
        println!("Period:   {} to {}", first.timestamp, last.timestamp);
    }
    println!("Bars:     {}", loaded.series.len());
    println!("Strategy: {}", describe_signal(&config.signal));
    println!("Warmup:   {} bars", result.warmup_bars);
    println!(
        "Events:   {} entries, {} crossover exits, {} stop-loss exits",
        result.event_counts.entries,
        result.event_counts.crossover_exits,
        result.event_counts.stop_loss_exits
    );
    println!();
    println!("--- Performance ---");
    print!("{}", format_report(&result.report));
    for warning in &loaded.warnings {
        println!("WARNING: {warning}");
    }

    if !no_artifacts {
        let manager = ArtifactManager::new(&output_dir)?.with_run_id(run_id);
        let paths = manager.save_run(&result, &loaded.series, &loaded.dataset_hash)?;
        println!();
        println!("Report: {}", paths.report_json.display());
        println!("Equity: {}", paths.equity_csv.display());
        println!("Chart:  {}", paths.equity_svg.display());
    }
    Ok(())
}

fn cmd_sweep(config: &BacktestConfig) -> Result<()> {
    let run_id = config.run_id().context("failed to hash configuration")?;
    info!(run_id = %run_id, "starting sweep");
    let loaded = load(config)?;
    let grid = config.sweep.grid();
    if grid.size() == 0 {
        bail!("sweep grid has no valid (short < long) combinations");
    }

    let mut sweep = ParamSweep::new(&loaded.series, config.backtest.run_settings());
    if let Some(workers) = config.sweep.workers {
        sweep = sweep.with_workers(workers);
    }

    let step = (grid.size() / 10).max(1);
    let results = sweep.run_with_progress(&grid, |done, total| {
        if done % step == 0 || done == total {
            info!(done, total, "sweep progress");
        }
    })?;

    results
        .write_csv(&config.sweep.output)
        .with_context(|| format!("failed to write {}", config.sweep.output.display()))?;

    println!();
    println!(
        "=== Top {} of {} by Sharpe ratio ===",
        config.sweep.top_k.min(results.len()),
        results.len()
    );
    print!("{}", format_top_results(&results.top_k(config.sweep.top_k)));
    if !results.failures().is_empty() {
        println!();
        println!("{} combination(s) failed:", results.failures().len());
        for failure in results.failures() {
            println!("  {}: {}", failure.params, failure.message);
        }
    }
    println!();
    println!("Results: {}", config.sweep.output.display());
    Ok(())
}

fn describe_signal(signal: &SignalConfig) -> String {
    match signal {
        SignalConfig::DualMa(p) => format!("dual_ma ({p})"),
        SignalConfig::MaClassifier(p) => format!("ma_classifier (window={})", p.window),
    }
}
