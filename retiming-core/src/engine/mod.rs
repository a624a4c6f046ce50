//! Equity-curve simulation.
//!
//! Converts a position series into per-bar returns, costs and a compounded
//! net-value curve. Positions act on the *next* bar's return (no look-ahead).

pub mod equity;

pub use equity::{simulate, CostModel, EngineConfig, EngineError, EquityCurve, EquityPoint};
