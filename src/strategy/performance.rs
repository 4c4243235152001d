//! Realised outcomes per strategy, fed back into signal priority.

use super::setup::StrategyKind;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Win rate assumed before a strategy has closed any trade.
pub const PRIOR_WIN_RATE: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyStats {
    pub wins: u32,
    pub losses: u32,
    pub realized_pnl: Decimal,
}

impl StrategyStats {
    pub fn trades(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> f64 {
        match self.trades() {
            0 => PRIOR_WIN_RATE,
            n => self.wins as f64 / n as f64,
        }
    }
}

#[derive(Debug, Default)]
pub struct PerformanceTracker {
    stats: Mutex<HashMap<StrategyKind, StrategyStats>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: StrategyKind, pnl: Decimal, is_win: bool) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(kind).or_default();
        if is_win {
            entry.wins += 1;
        } else {
            entry.losses += 1;
        }
        entry.realized_pnl += pnl;
    }

    pub fn win_rate(&self, kind: StrategyKind) -> f64 {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(&kind).map_or(PRIOR_WIN_RATE, StrategyStats::win_rate)
    }

    pub fn stats(&self, kind: StrategyKind) -> StrategyStats {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(&kind).cloned().unwrap_or_default()
    }

    /// Win rates for every strategy, read once per scan.
    pub fn win_rates(&self) -> HashMap<StrategyKind, f64> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        StrategyKind::ALL
            .into_iter()
            .map(|kind| (kind, stats.get(&kind).map_or(PRIOR_WIN_RATE, StrategyStats::win_rate)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_prior_without_history() {
        let tracker = PerformanceTracker::new();
        assert_eq!(tracker.win_rate(StrategyKind::Swing), 0.5);
        assert_eq!(tracker.win_rates()[&StrategyKind::Dca], 0.5);
    }

    #[test]
    fn test_win_rate_and_pnl() {
        let tracker = PerformanceTracker::new();
        tracker.record(StrategyKind::Channel, dec!(40), true);
        tracker.record(StrategyKind::Channel, dec!(25.5), true);
        tracker.record(StrategyKind::Channel, dec!(-15), false);

        let stats = tracker.stats(StrategyKind::Channel);
        assert_eq!(stats.trades(), 3);
        assert_eq!(stats.realized_pnl, dec!(50.5));
        assert!((tracker.win_rate(StrategyKind::Channel) - 2.0 / 3.0).abs() < 1e-12);
        // Other strategies unaffected
        assert_eq!(tracker.win_rate(StrategyKind::Swing), 0.5);
    }
}
