//! Retiming Core: price series, signal rules, equity-curve simulation.
//!
//! This crate contains the deterministic heart of the backtester:
//! - Domain types (bars, price series, position series)
//! - Rolling-window indicators behind the `Indicator` trait
//! - Position rules: the stateful dual-MA crossover with stop-loss and the
//!   stateless MA classifier
//! - The equity engine (lagged positions, flat-rate costs, compounding)

pub mod domain;
pub mod engine;
pub mod indicators;
pub mod signal;
