//! Equity engine: lag discipline, flat-rate cost model, compounding.
//!
//! For bar `i`:
//! - `lagged_position[i] = position[i-1]`, 0 at bar 0
//! - `bar_return[i] = close[i] / close[i-1] - 1`, 0 at bar 0
//! - `cost[i] = |lagged[i] - lagged[i-1]| * (fee_rate + slippage_rate)`
//! - `net_return[i] = lagged[i] * bar_return[i] - cost[i]`
//! - `net_value[i] = prod_{k<=i} (1 + net_return[k])`
//! - `equity[i] = net_value[i] * initial_capital`
//!
//! The loop is strictly sequential, so identical inputs always give a
//! bit-identical curve.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{PositionSeries, PriceSeries};

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("cannot simulate an empty price series")]
    EmptySeries,
    #[error("position series has {positions} values but price series has {bars} bars")]
    LengthMismatch { positions: usize, bars: usize },
    #[error("close at bar {index} is not a positive finite number ({close})")]
    InvalidPrice { index: usize, close: f64 },
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

/// Flat proportional costs charged per unit of position change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub fee_rate: f64,
    pub slippage_rate: f64,
}

impl CostModel {
    pub fn new(fee_rate: f64, slippage_rate: f64) -> Self {
        Self {
            fee_rate,
            slippage_rate,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Cost rate per unit of turnover.
    pub fn rate(&self) -> f64 {
        self.fee_rate + self.slippage_rate
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(0.001, 0.008)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub costs: CostModel,
    pub initial_capital: f64,
}

impl EngineConfig {
    pub fn new(costs: CostModel, initial_capital: f64) -> Self {
        Self {
            costs,
            initial_capital,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let CostModel {
            fee_rate,
            slippage_rate,
        } = self.costs;
        if !fee_rate.is_finite() || fee_rate < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "fee_rate must be >= 0, got {fee_rate}"
            )));
        }
        if !slippage_rate.is_finite() || slippage_rate < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "slippage_rate must be >= 0, got {slippage_rate}"
            )));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "initial_capital must be > 0, got {}",
                self.initial_capital
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(CostModel::default(), 10_000.0)
    }
}

/// One bar of the simulated curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub lagged_position: i8,
    pub bar_return: f64,
    pub cost: f64,
    pub net_return: f64,
    pub net_value: f64,
    pub equity: f64,
}

/// Full simulated curve, one point per bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityCurve {
    pub initial_capital: f64,
    pub points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn net_values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.net_value).collect()
    }

    pub fn net_returns(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.net_return).collect()
    }

    pub fn lagged_positions(&self) -> Vec<i8> {
        self.points.iter().map(|p| p.lagged_position).collect()
    }

    pub fn equity(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.equity).collect()
    }

    pub fn first(&self) -> Option<&EquityPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&EquityPoint> {
        self.points.last()
    }
}

/// Simulate the equity curve for `positions` over `series`.
pub fn simulate(
    series: &PriceSeries,
    positions: &PositionSeries,
    config: &EngineConfig,
) -> Result<EquityCurve, EngineError> {
    config.validate()?;
    if series.is_empty() {
        return Err(EngineError::EmptySeries);
    }
    if positions.len() != series.len() {
        return Err(EngineError::LengthMismatch {
            positions: positions.len(),
            bars: series.len(),
        });
    }

    let bars = series.bars();
    if let Some((index, bar)) = bars
        .iter()
        .enumerate()
        .find(|(_, b)| !b.close.is_finite() || b.close <= 0.0)
    {
        return Err(EngineError::InvalidPrice {
            index,
            close: bar.close,
        });
    }

    let rate = config.costs.rate();
    let held = positions.values();
    let mut points = Vec::with_capacity(bars.len());
    let mut net_value = 1.0_f64;
    let mut prev_lagged: i8 = 0;

    for (i, bar) in bars.iter().enumerate() {
        let (lagged, bar_return) = if i == 0 {
            (0, 0.0)
        } else {
            (held[i - 1], bar.close / bars[i - 1].close - 1.0)
        };
        let change = f64::from((lagged - prev_lagged).abs());
        let cost = change * rate;
        let net_return = f64::from(lagged) * bar_return - cost;
        net_value *= 1.0 + net_return;

        points.push(EquityPoint {
            timestamp: bar.timestamp,
            lagged_position: lagged,
            bar_return,
            cost,
            net_return,
            net_value,
            equity: net_value * config.initial_capital,
        });
        prev_lagged = lagged;
    }

    Ok(EquityCurve {
        initial_capital: config.initial_capital,
        points,
    })
}
