//! Signal rules: turn a price series into a position series.
//!
//! Two families:
//! - stateless classifiers, where each bar's position depends only on that
//!   bar's price and indicator values (`MaClassifier`);
//! - stateful rules driven by an explicit transition function threaded across
//!   the series (`DualMaCrossover`).
//!
//! Rules never see equity or costs; they only describe the exposure the
//! strategy wants at the close of each bar.

pub mod classifier;
pub mod crossover;

pub use classifier::{ClassifierParams, MaClassifier};
pub use crossover::{transition, BarInputs, DualMaCrossover, DualMaParams, MaPair, SignalState, Step};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PositionSeries, PriceSeries};

#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("insufficient history: window of {window} bars needs at least {window} bars, series has {bars}")]
    InsufficientHistory { window: usize, bars: usize },
}

/// What happened on a bar where a stateful rule changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalEventKind {
    /// Golden cross: FLAT -> LONG.
    Entry,
    /// Death cross: LONG -> FLAT.
    CrossoverExit,
    /// Close fell through the stop level: LONG -> FLAT.
    StopLoss,
}

/// A state change recorded while generating positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub kind: SignalEventKind,
    /// Close of the bar the event fired on.
    pub price: f64,
}

/// Output of a rule: the positions plus any state changes it recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalOutput {
    pub positions: PositionSeries,
    /// Empty for stateless rules.
    pub events: Vec<SignalEvent>,
}

impl SignalOutput {
    pub fn count(&self, kind: SignalEventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

/// Trait for position rules.
///
/// `generate` must return exactly one position per bar, with a concrete value
/// at index 0, and must only use bars `0..=i` when deciding position `i`.
pub trait PositionRule: Send + Sync {
    /// Human-readable name (e.g. "dual_ma").
    fn name(&self) -> &str;

    /// Number of bars before the rule can leave the flat state.
    fn warmup_bars(&self) -> usize;

    fn generate(&self, series: &PriceSeries) -> Result<SignalOutput, SignalError>;
}

/// Serializable rule selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalConfig {
    /// Dual moving-average crossover with a stop-loss.
    DualMa(DualMaParams),
    /// Close above/below a single moving average.
    MaClassifier(ClassifierParams),
}

impl SignalConfig {
    /// Build the configured rule, validating its parameters.
    pub fn build(&self) -> Result<Box<dyn PositionRule>, SignalError> {
        match self {
            SignalConfig::DualMa(params) => Ok(Box::new(DualMaCrossover::new(params.clone())?)),
            SignalConfig::MaClassifier(params) => Ok(Box::new(MaClassifier::new(params.window)?)),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig::DualMa(DualMaParams::default())
    }
}
