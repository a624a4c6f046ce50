//! Domain types: bars, price series, position series.

pub mod bar;
pub mod position;
pub mod series;

pub use bar::PriceBar;
pub use position::{PositionError, PositionSeries};
pub use series::{PriceSeries, SeriesError};
