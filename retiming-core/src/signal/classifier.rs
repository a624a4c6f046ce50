//! Stateless moving-average classifier.
//!
//! Long when the close is above its moving average, short when below, flat
//! on equality or while the average is still warming up.

use serde::{Deserialize, Serialize};

use crate::domain::{PositionSeries, PriceSeries};
use crate::indicators::{Indicator, Sma};

use super::{PositionRule, SignalError, SignalOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierParams {
    pub window: usize,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self { window: 20 }
    }
}

#[derive(Debug, Clone)]
pub struct MaClassifier {
    ma: Sma,
}

impl MaClassifier {
    pub fn new(window: usize) -> Result<Self, SignalError> {
        if window == 0 {
            return Err(SignalError::InvalidParameter("window must be >= 1".into()));
        }
        Ok(Self {
            ma: Sma::new(window),
        })
    }
}

impl PositionRule for MaClassifier {
    fn name(&self) -> &str {
        "ma_classifier"
    }

    fn warmup_bars(&self) -> usize {
        self.ma.period()
    }

    fn generate(&self, series: &PriceSeries) -> Result<SignalOutput, SignalError> {
        let ma = self.ma.compute(series);
        let positions = series
            .bars()
            .iter()
            .zip(&ma)
            .map(|(bar, &avg)| {
                if bar.close > avg {
                    1
                } else if bar.close < avg {
                    -1
                } else {
                    0
                }
            })
            .collect();

        Ok(SignalOutput {
            positions: PositionSeries::from_checked(positions),
            events: Vec::new(),
        })
    }
}
