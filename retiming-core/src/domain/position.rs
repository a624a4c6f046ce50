//! PositionSeries: target exposure per bar, aligned 1:1 with a PriceSeries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("position {value} at bar {index} is outside {{-1, 0, 1}}")]
    OutOfRange { index: usize, value: i8 },
}

/// Position decided at the close of each bar: -1 short, 0 flat, 1 long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSeries {
    values: Vec<i8>,
}

impl PositionSeries {
    pub fn new(values: Vec<i8>) -> Result<Self, PositionError> {
        if let Some((index, &value)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !(-1..=1).contains(*v))
        {
            return Err(PositionError::OutOfRange { index, value });
        }
        Ok(Self { values })
    }

    /// Constructor for generators that only ever emit -1/0/1.
    pub(crate) fn from_checked(values: Vec<i8>) -> Self {
        debug_assert!(values.iter().all(|v| (-1..=1).contains(v)));
        Self { values }
    }

    pub fn values(&self) -> &[i8] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<i8> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of bars with a non-zero position.
    pub fn exposed_bars(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0).count()
    }
}
