//! Market-data boundary and a CSV-backed implementation.
//!
//! Expected file layout: one `<SYMBOL>.csv` per symbol in a directory.
//! ```csv
//! timestamp,open,high,low,close,volume
//! 2024-01-01T00:00:00Z,42000.5,42100.0,41950.2,42050.0,1250.4
//! ```

use super::bar::Bar;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by a market-data provider.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("no bars available for {0}")]
    Empty(String),
}

/// Source of recent OHLCV bars.
///
/// Implementations must be cheap to call concurrently; the orchestrator
/// requests every symbol of the universe in parallel once per cycle.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Symbols this provider can serve, in deterministic order.
    fn symbols(&self) -> Vec<String>;

    /// The most recent `limit` bars for `symbol`, oldest first.
    async fn recent_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, DataError>;
}

/// Row layout of a bar file.
#[derive(Debug, Deserialize)]
struct CsvBarRow {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl From<CsvBarRow> for Bar {
    fn from(row: CsvBarRow) -> Self {
        Bar::new(row.timestamp, row.open, row.high, row.low, row.close, row.volume)
    }
}

/// Serves bars loaded from CSV files, or from memory in tests.
#[derive(Debug, Clone, Default)]
pub struct CsvMarketData {
    bars: HashMap<String, Vec<Bar>>,
}

impl CsvMarketData {
    /// Load every `*.csv` file in `dir`; the file stem is the symbol.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read data directory: {}", dir.display()))?;

        let mut bars = HashMap::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(symbol) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let series = Self::read_file(&path)?;
            debug!(%symbol, bars = series.len(), "Loaded bar file");
            bars.insert(symbol.to_uppercase(), series);
        }

        if bars.is_empty() {
            anyhow::bail!("No bar files found in {}", dir.display());
        }

        info!(symbols = bars.len(), dir = %dir.display(), "Market data loaded");
        Ok(Self { bars })
    }

    /// Parse a single bar file, dropping malformed rows.
    pub fn read_file(path: &Path) -> Result<Vec<Bar>> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;
        Self::read_rows(&mut reader, &path.display().to_string())
    }

    /// Parse bar rows from in-memory CSV content.
    pub fn parse_content(content: &str) -> Result<Vec<Bar>> {
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        Self::read_rows(&mut reader, "<memory>")
    }

    fn read_rows<R: std::io::Read>(reader: &mut csv::Reader<R>, source: &str) -> Result<Vec<Bar>> {
        let mut bars = Vec::new();
        let mut skipped = 0usize;

        for (idx, record) in reader.deserialize::<CsvBarRow>().enumerate() {
            let row = record.with_context(|| format!("Failed to parse row {} of {}", idx + 1, source))?;
            let bar = Bar::from(row);
            if bar.is_well_formed() {
                bars.push(bar);
            } else {
                skipped += 1;
            }
        }

        if skipped > 0 {
            warn!(source, skipped, "Dropped malformed bars");
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    /// Build a provider from bars already in memory.
    pub fn from_bars(bars: HashMap<String, Vec<Bar>>) -> Self {
        Self { bars }
    }
}

#[async_trait]
impl MarketDataProvider for CsvMarketData {
    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.bars.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    async fn recent_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, DataError> {
        let series = self
            .bars
            .get(symbol)
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()))?;

        if series.is_empty() {
            return Err(DataError::Empty(symbol.to_string()));
        }

        let start = series.len().saturating_sub(limit);
        Ok(series[start..].to_vec())
    }
}
