//! Exit-condition evaluation for open positions.

use crate::config::{Config, PerStrategy};
use crate::market::Bar;
use crate::strategy::{ActivePosition, SetupPayload, TradeSide};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a position is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TimeExit,
    PatternInvalidated,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            ExitReason::TimeExit => write!(f, "TIME_EXIT"),
            ExitReason::PatternInvalidated => write!(f, "PATTERN_INVALIDATED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitSignal {
    pub reason: ExitReason,
    pub exit_price: f64,
}

/// Checks open positions against the latest bar.
#[derive(Debug, Clone)]
pub struct ExitMonitor {
    max_hold_hours: PerStrategy<i64>,
    invalidation_buffer: f64,
}

impl ExitMonitor {
    pub fn new(max_hold_hours: PerStrategy<i64>, invalidation_buffer: f64) -> Self {
        Self {
            max_hold_hours,
            invalidation_buffer,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.scheduler.max_hold_hours.clone(),
            config.channel.invalidation_buffer,
        )
    }

    /// First matching exit, checked in order: stop, target, pattern, time.
    ///
    /// A bar that touches both stop and target is treated as stopped out.
    pub fn evaluate(&self, position: &ActivePosition, bar: &Bar, now: DateTime<Utc>) -> Option<ExitSignal> {
        let setup = &position.signal.setup;
        let stop = setup.stop_loss();
        let target = setup.take_profit();

        let (stop_hit, target_hit) = match setup.side() {
            TradeSide::Buy => (bar.low <= stop, bar.high >= target),
            TradeSide::Sell => (bar.high >= stop, bar.low <= target),
        };
        if stop_hit {
            return Some(ExitSignal {
                reason: ExitReason::StopLoss,
                exit_price: stop,
            });
        }
        if target_hit {
            return Some(ExitSignal {
                reason: ExitReason::TakeProfit,
                exit_price: target,
            });
        }

        if let SetupPayload::Channel(channel) = setup.payload() {
            let buffer = self.invalidation_buffer;
            let broken = match setup.side() {
                TradeSide::Buy => bar.close < channel.lower * (1.0 - buffer),
                TradeSide::Sell => bar.close > channel.upper * (1.0 + buffer),
            };
            if broken {
                return Some(ExitSignal {
                    reason: ExitReason::PatternInvalidated,
                    exit_price: bar.close,
                });
            }
        }

        let max_hold = Duration::hours(*self.max_hold_hours.get(setup.kind()));
        if now - position.opened_at > max_hold {
            return Some(ExitSignal {
                reason: ExitReason::TimeExit,
                exit_price: bar.close,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PositionHandle;
    use crate::strategy::{testing, StrategyKind};
    use rust_decimal_macros::dec;

    // ==================== Test Helpers ====================

    /// Long at 100, stop 95, target 110.
    fn position(kind: StrategyKind, opened_at: DateTime<Utc>) -> ActivePosition {
        let signal = testing::signal("BTCUSDT", kind, 0.7, 0.6, dec!(300));
        ActivePosition {
            handle: PositionHandle {
                id: "PAPER-1".to_string(),
                symbol: "BTCUSDT".to_string(),
                side: TradeSide::Buy,
                strategy: kind,
                filled_price: dec!(100),
                quantity: dec!(3),
                opened_at,
            },
            reserved_capital: dec!(300),
            opened_at,
            signal,
        }
    }

    fn bar(low: f64, high: f64, close: f64) -> Bar {
        Bar::new(Utc::now(), close, high, low, close, 1000.0)
    }

    fn monitor() -> ExitMonitor {
        ExitMonitor::from_config(&Config::default())
    }

    // ==================== Price Exits ====================

    #[test]
    fn test_stop_loss_touch() {
        let now = Utc::now();
        let exit = monitor()
            .evaluate(&position(StrategyKind::Swing, now), &bar(94.5, 99.0, 96.0), now)
            .unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.exit_price, 95.0);
    }

    #[test]
    fn test_take_profit_touch() {
        let now = Utc::now();
        let exit = monitor()
            .evaluate(&position(StrategyKind::Swing, now), &bar(104.0, 111.0, 109.0), now)
            .unwrap();
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert_eq!(exit.exit_price, 110.0);
    }

    #[test]
    fn test_stop_wins_same_bar() {
        let now = Utc::now();
        let exit = monitor()
            .evaluate(&position(StrategyKind::Dca, now), &bar(94.0, 111.0, 100.0), now)
            .unwrap();
        assert_eq!(exit.reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_no_exit_inside_range() {
        let now = Utc::now();
        assert!(monitor()
            .evaluate(&position(StrategyKind::Swing, now), &bar(98.0, 103.0, 101.0), now)
            .is_none());
    }

    // ==================== Time & Pattern Exits ====================

    #[test]
    fn test_time_exit_per_strategy() {
        let now = Utc::now();
        let opened = now - Duration::hours(50);
        let quiet = bar(98.0, 103.0, 101.0);

        // Channel horizon is 48h, swing is 72h
        let exit = monitor().evaluate(&position(StrategyKind::Channel, opened), &quiet, now);
        assert_eq!(exit.map(|e| e.reason), Some(ExitReason::TimeExit));
        assert!(monitor()
            .evaluate(&position(StrategyKind::Swing, opened), &quiet, now)
            .is_none());
    }

    #[test]
    fn test_channel_breakdown_invalidates() {
        let now = Utc::now();
        // Channel lower line is 99; close 98.2 is 0.8% below it, above the 95 stop
        let exit = monitor()
            .evaluate(&position(StrategyKind::Channel, now), &bar(98.0, 99.5, 98.2), now)
            .unwrap();
        assert_eq!(exit.reason, ExitReason::PatternInvalidated);
        assert_eq!(exit.exit_price, 98.2);

        // The same bar is not a pattern exit for a swing position
        assert!(monitor()
            .evaluate(&position(StrategyKind::Swing, now), &bar(98.0, 99.5, 98.2), now)
            .is_none());
    }
}
