//! Request and response types at the execution boundary.

use crate::risk::ExitReason;
use crate::strategy::{Signal, StrategyKind, TradeSide};
use crate::utils::decimal::{round_to_precision, safe_div, to_decimal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quantity precision used when sizing orders.
const QUANTITY_DECIMALS: u32 = 8;

/// Order to open a position for an admitted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub strategy: StrategyKind,
    pub entry_price: Decimal,
    /// Capital committed in quote currency
    pub notional: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

impl ExecutionRequest {
    pub fn from_signal(signal: &Signal) -> Self {
        let setup = &signal.setup;
        let entry_price = to_decimal(setup.entry_price());
        let notional = signal.required_capital;

        Self {
            symbol: setup.symbol().to_string(),
            side: setup.side(),
            strategy: setup.kind(),
            entry_price,
            notional,
            quantity: round_to_precision(safe_div(notional, entry_price), QUANTITY_DECIMALS),
            stop_loss: to_decimal(setup.stop_loss()),
            take_profit: to_decimal(setup.take_profit()),
        }
    }
}

/// Venue-side reference to an open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionHandle {
    pub id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub strategy: StrategyKind,
    pub filled_price: Decimal,
    pub quantity: Decimal,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub handle: PositionHandle,
    pub exit_price: Decimal,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseReport {
    pub position_id: String,
    pub symbol: String,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}

impl CloseReport {
    pub fn is_win(&self) -> bool {
        self.realized_pnl > Decimal::ZERO
    }
}

/// Errors from the execution collaborator.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("order rejected for {symbol}: {reason}")]
    Rejected { symbol: String, reason: String },

    #[error("unknown position: {0}")]
    UnknownPosition(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("execution venue unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::testing;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_from_signal() {
        let signal = testing::signal("ETHUSDT", StrategyKind::Swing, 0.7, 0.6, dec!(250));
        let request = ExecutionRequest::from_signal(&signal);

        assert_eq!(request.symbol, "ETHUSDT");
        assert_eq!(request.strategy, StrategyKind::Swing);
        assert_eq!(request.side, TradeSide::Buy);
        assert_eq!(request.entry_price, dec!(100));
        assert_eq!(request.notional, dec!(250));
        assert_eq!(request.quantity, dec!(2.5));
        assert_eq!(request.stop_loss, dec!(95));
        assert_eq!(request.take_profit, dec!(110));
    }
}
