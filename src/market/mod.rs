//! Market data types, the market-data boundary and regime classification.

mod bar;
mod data;
mod regime;

pub use bar::{Bar, BarColumns, MarketSnapshot};
pub use data::{CsvMarketData, DataError, MarketDataProvider};
pub use regime::{MarketRegime, RegimeDetector};
