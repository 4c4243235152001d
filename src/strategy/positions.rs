//! Open positions, at most one per symbol across all strategies.

use super::signal::Signal;
use crate::exchange::PositionHandle;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
pub struct ActivePosition {
    /// Snapshot of the signal that opened the position
    pub signal: Signal,
    /// Exact amount reserved from the strategy's pool
    pub reserved_capital: Decimal,
    pub handle: PositionHandle,
    pub opened_at: DateTime<Utc>,
}

impl ActivePosition {
    pub fn symbol(&self) -> &str {
        self.signal.symbol()
    }
}

#[derive(Debug, Default)]
struct BookState {
    active: HashMap<String, ActivePosition>,
    /// Symbols with an execution in flight
    claimed: HashSet<String>,
}

/// Symbol-keyed position registry.
///
/// A symbol must be claimed before execution starts; the claim is turned into
/// an active position on fill or abandoned on failure.
#[derive(Debug, Default)]
pub struct PositionBook {
    state: Mutex<BookState>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a free symbol for execution.
    pub fn try_claim(&self, symbol: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.active.contains_key(symbol) || state.claimed.contains(symbol) {
            return false;
        }
        state.claimed.insert(symbol.to_string())
    }

    /// Drop a claim after a failed execution.
    pub fn abandon(&self, symbol: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.claimed.remove(symbol);
    }

    /// Record a filled position, converting the claim.
    pub fn activate(&self, position: ActivePosition) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let symbol = position.symbol().to_string();
        if !state.claimed.remove(&symbol) {
            warn!(%symbol, "Activating position without a claim");
        }
        state.active.insert(symbol, position);
    }

    pub fn remove(&self, symbol: &str) -> Option<ActivePosition> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.active.remove(symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<ActivePosition> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.active.get(symbol).cloned()
    }

    /// Open or in-flight symbols, read once per cycle.
    pub fn active_symbols(&self) -> HashSet<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.active.keys().chain(state.claimed.iter()).cloned().collect()
    }

    /// Active positions sorted by symbol.
    pub fn snapshot(&self) -> Vec<ActivePosition> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut positions: Vec<ActivePosition> = state.active.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol().cmp(b.symbol()));
        positions
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{testing, StrategyKind, TradeSide};
    use rust_decimal_macros::dec;

    fn position(symbol: &str) -> ActivePosition {
        let signal = testing::signal(symbol, StrategyKind::Channel, 0.7, 0.6, dec!(300));
        ActivePosition {
            handle: PositionHandle {
                id: format!("PAPER-{}", symbol),
                symbol: symbol.to_string(),
                side: TradeSide::Buy,
                strategy: StrategyKind::Channel,
                filled_price: dec!(100),
                quantity: dec!(3),
                opened_at: signal.created_at,
            },
            opened_at: signal.created_at,
            reserved_capital: dec!(300),
            signal,
        }
    }

    #[test]
    fn test_claim_is_exclusive() {
        let book = PositionBook::new();

        assert!(book.try_claim("BTCUSDT"));
        assert!(!book.try_claim("BTCUSDT"));
        assert!(book.active_symbols().contains("BTCUSDT"));

        book.abandon("BTCUSDT");
        assert!(!book.active_symbols().contains("BTCUSDT"));
        assert!(book.try_claim("BTCUSDT"));
    }

    #[test]
    fn test_one_position_per_symbol() {
        let book = PositionBook::new();
        assert!(book.try_claim("BTCUSDT"));
        book.activate(position("BTCUSDT"));

        assert_eq!(book.len(), 1);
        assert!(!book.try_claim("BTCUSDT"));
        assert!(book.active_symbols().contains("BTCUSDT"));

        let removed = book.remove("BTCUSDT").unwrap();
        assert_eq!(removed.reserved_capital, dec!(300));
        assert!(book.is_empty());
        assert!(book.try_claim("BTCUSDT"));
    }

    #[test]
    fn test_snapshot_sorted() {
        let book = PositionBook::new();
        for symbol in ["SOLUSDT", "BTCUSDT", "ETHUSDT"] {
            assert!(book.try_claim(symbol));
            book.activate(position(symbol));
        }

        let symbols: Vec<String> = book.snapshot().iter().map(|p| p.symbol().to_string()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    }
}
