//! OHLCV bars and per-cycle market snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A single OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Create a new bar.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// A bar is usable when every field is finite, prices are positive and
    /// the high/low envelope contains open and close.
    pub fn is_well_formed(&self) -> bool {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        fields.iter().all(|v| v.is_finite())
            && self.low > 0.0
            && self.volume >= 0.0
            && self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}

/// Column views over a bar slice, computed once per detector call.
#[derive(Debug, Clone, Default)]
pub struct BarColumns {
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl BarColumns {
    pub fn from_bars(bars: &[Bar]) -> Self {
        let mut columns = Self {
            high: Vec::with_capacity(bars.len()),
            low: Vec::with_capacity(bars.len()),
            close: Vec::with_capacity(bars.len()),
            volume: Vec::with_capacity(bars.len()),
        };
        for bar in bars {
            columns.high.push(bar.high);
            columns.low.push(bar.low);
            columns.close.push(bar.close);
            columns.volume.push(bar.volume);
        }
        columns
    }
}

/// Recent bars for every symbol in the universe, as fetched for one cycle.
///
/// Context symbols (the regime reference when it sits outside the universe)
/// are readable through `bars` but never listed by `symbols`.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub taken_at: DateTime<Utc>,
    bars: HashMap<String, Vec<Bar>>,
    context: HashSet<String>,
}

impl MarketSnapshot {
    /// Create an empty snapshot at the given timestamp.
    pub fn new(taken_at: DateTime<Utc>) -> Self {
        Self {
            taken_at,
            bars: HashMap::new(),
            context: HashSet::new(),
        }
    }

    /// Add (or replace) a symbol's bars.
    pub fn insert(&mut self, symbol: impl Into<String>, bars: Vec<Bar>) {
        let symbol = symbol.into();
        self.context.remove(&symbol);
        self.bars.insert(symbol, bars);
    }

    /// Add bars that are read for context only and never scanned.
    pub fn insert_context(&mut self, symbol: impl Into<String>, bars: Vec<Bar>) {
        let symbol = symbol.into();
        self.bars.insert(symbol.clone(), bars);
        self.context.insert(symbol);
    }

    /// Builder-style insert.
    pub fn with_symbol(mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.insert(symbol, bars);
        self
    }

    pub fn bars(&self, symbol: &str) -> Option<&[Bar]> {
        self.bars.get(symbol).map(Vec::as_slice)
    }

    pub fn latest(&self, symbol: &str) -> Option<&Bar> {
        self.bars.get(symbol).and_then(|b| b.last())
    }

    /// Scannable symbols in deterministic (sorted) order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self
            .bars
            .keys()
            .filter(|symbol| !self.context.contains(*symbol))
            .map(String::as_str)
            .collect();
        symbols.sort_unstable();
        symbols
    }

    /// Number of fetched series, context included.
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_well_formed_bar() {
        assert!(Bar::new(ts(), 100.0, 101.0, 99.0, 100.5, 10.0).is_well_formed());
        // High below close
        assert!(!Bar::new(ts(), 100.0, 100.2, 99.0, 100.5, 10.0).is_well_formed());
        assert!(!Bar::new(ts(), 100.0, f64::NAN, 99.0, 100.5, 10.0).is_well_formed());
    }

    #[test]
    fn test_snapshot_symbols_sorted() {
        let bar = Bar::new(ts(), 1.0, 1.0, 1.0, 1.0, 1.0);
        let snapshot = MarketSnapshot::new(ts())
            .with_symbol("SOLUSDT", vec![bar])
            .with_symbol("BTCUSDT", vec![bar]);

        assert_eq!(snapshot.symbols(), vec!["BTCUSDT", "SOLUSDT"]);
        assert_eq!(snapshot.latest("BTCUSDT"), Some(&bar));
        assert!(snapshot.bars("ETHUSDT").is_none());
    }

    #[test]
    fn test_context_symbol_readable_but_not_scanned() {
        let bar = Bar::new(ts(), 1.0, 1.0, 1.0, 1.0, 1.0);
        let mut snapshot = MarketSnapshot::new(ts()).with_symbol("SOLUSDT", vec![bar]);
        snapshot.insert_context("BTCUSDT", vec![bar]);

        assert_eq!(snapshot.symbols(), vec!["SOLUSDT"]);
        assert_eq!(snapshot.bars("BTCUSDT").map(<[Bar]>::len), Some(1));
        assert_eq!(snapshot.len(), 2);

        // A regular insert promotes it back into the scan set
        snapshot.insert("BTCUSDT", vec![bar]);
        assert_eq!(snapshot.symbols(), vec!["BTCUSDT", "SOLUSDT"]);
    }
}
