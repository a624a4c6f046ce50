//! Dual moving-average crossover with a fixed-fraction stop-loss.
//!
//! Two states, FLAT and LONG. Per bar, in priority order:
//! 1. either MA undefined: hold the previous position;
//! 2. LONG and close <= entry * (1 - stop): exit (stop-loss), nothing else this bar;
//! 3. FLAT and golden cross: enter at the close;
//! 4. LONG and death cross: exit.
//!
//! A cross needs the previous bar on or across the line (`<=` / `>=`) and the
//! current bar strictly past it (`>` / `<`). On the first bar where both
//! averages exist there is no previous pair; that bar counts as being on the
//! line, so a trend already in place at warmup end opens a position.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{PositionSeries, PriceSeries};
use crate::indicators::{Indicator, Sma};

use super::{PositionRule, SignalError, SignalEvent, SignalEventKind, SignalOutput};

/// Parameters of the crossover rule. One grid cell of the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DualMaParams {
    pub short_window: usize,
    pub long_window: usize,
    pub stop_loss_fraction: f64,
}

impl Default for DualMaParams {
    fn default() -> Self {
        Self {
            short_window: 80,
            long_window: 500,
            stop_loss_fraction: 0.10,
        }
    }
}

impl DualMaParams {
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.short_window == 0 {
            return Err(SignalError::InvalidParameter(
                "short_window must be >= 1".into(),
            ));
        }
        if self.short_window >= self.long_window {
            return Err(SignalError::InvalidParameter(format!(
                "short_window ({}) must be < long_window ({})",
                self.short_window, self.long_window
            )));
        }
        if !(0.0..=1.0).contains(&self.stop_loss_fraction) {
            return Err(SignalError::InvalidParameter(format!(
                "stop_loss_fraction ({}) must be within [0, 1]",
                self.stop_loss_fraction
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DualMaParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "short={} long={} stop_loss={}",
            self.short_window, self.long_window, self.stop_loss_fraction
        )
    }
}

/// Crossover state. The entry price only exists while LONG.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SignalState {
    #[default]
    Flat,
    Long { entry_price: f64 },
}

impl SignalState {
    /// Position emitted for this state.
    pub fn position(&self) -> i8 {
        match self {
            SignalState::Flat => 0,
            SignalState::Long { .. } => 1,
        }
    }
}

/// Short and long MA values at one bar, both defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaPair {
    pub short: f64,
    pub long: f64,
}

impl MaPair {
    /// `None` when either average is undefined at `index`.
    pub fn at(short: &[f64], long: &[f64], index: usize) -> Option<Self> {
        let s = *short.get(index)?;
        let l = *long.get(index)?;
        if s.is_nan() || l.is_nan() {
            return None;
        }
        Some(Self { short: s, long: l })
    }
}

/// Everything the transition function reads for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarInputs {
    pub close: f64,
    pub current: Option<MaPair>,
    pub previous: Option<MaPair>,
}

/// Result of one transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub state: SignalState,
    pub position: i8,
    pub event: Option<SignalEventKind>,
}

impl Step {
    fn stay(state: SignalState) -> Self {
        Self {
            state,
            position: state.position(),
            event: None,
        }
    }

    fn to(state: SignalState, event: SignalEventKind) -> Self {
        Self {
            state,
            position: state.position(),
            event: Some(event),
        }
    }
}

/// Pure crossover transition: `(state, bar) -> (state', position)`.
pub fn transition(state: SignalState, bar: &BarInputs, stop_loss_fraction: f64) -> Step {
    let Some(cur) = bar.current else {
        return Step::stay(state);
    };

    if let SignalState::Long { entry_price } = state {
        if bar.close <= entry_price * (1.0 - stop_loss_fraction) {
            return Step::to(SignalState::Flat, SignalEventKind::StopLoss);
        }
    }

    let was_below = bar.previous.map_or(true, |p| p.short <= p.long);
    let was_above = bar.previous.map_or(true, |p| p.short >= p.long);

    match state {
        SignalState::Flat if was_below && cur.short > cur.long => Step::to(
            SignalState::Long {
                entry_price: bar.close,
            },
            SignalEventKind::Entry,
        ),
        SignalState::Long { .. } if was_above && cur.short < cur.long => {
            Step::to(SignalState::Flat, SignalEventKind::CrossoverExit)
        }
        _ => Step::stay(state),
    }
}

/// Long-only dual-MA crossover rule with a stop-loss.
#[derive(Debug, Clone)]
pub struct DualMaCrossover {
    params: DualMaParams,
    short_ma: Sma,
    long_ma: Sma,
}

impl DualMaCrossover {
    pub fn new(params: DualMaParams) -> Result<Self, SignalError> {
        params.validate()?;
        Ok(Self {
            short_ma: Sma::new(params.short_window),
            long_ma: Sma::new(params.long_window),
            params,
        })
    }

    pub fn params(&self) -> &DualMaParams {
        &self.params
    }
}

impl PositionRule for DualMaCrossover {
    fn name(&self) -> &str {
        "dual_ma"
    }

    fn warmup_bars(&self) -> usize {
        self.params.long_window
    }

    fn generate(&self, series: &PriceSeries) -> Result<SignalOutput, SignalError> {
        let n = series.len();
        if n < self.params.long_window {
            return Err(SignalError::InsufficientHistory {
                window: self.params.long_window,
                bars: n,
            });
        }

        let bars = series.bars();
        let short = self.short_ma.compute(series);
        let long = self.long_ma.compute(series);

        let mut positions = Vec::with_capacity(n);
        let mut events = Vec::new();
        let mut state = SignalState::Flat;
        // Bar 0 has no predecessor to cross from.
        positions.push(state.position());

        for i in 1..n {
            let inputs = BarInputs {
                close: bars[i].close,
                current: MaPair::at(&short, &long, i),
                previous: MaPair::at(&short, &long, i - 1),
            };
            let step = transition(state, &inputs, self.params.stop_loss_fraction);
            if let Some(kind) = step.event {
                events.push(SignalEvent {
                    bar_index: i,
                    timestamp: bars[i].timestamp,
                    kind,
                    price: bars[i].close,
                });
            }
            state = step.state;
            positions.push(step.position);
        }

        Ok(SignalOutput {
            positions: PositionSeries::from_checked(positions),
            events,
        })
    }
}
