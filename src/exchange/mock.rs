//! Paper executor: fills every order at the requested price.

use super::traits::ExecutionClient;
use super::types::*;
use crate::strategy::TradeSide;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Simulated book of open paper positions.
#[derive(Debug, Default)]
pub struct PaperState {
    pub positions: HashMap<String, PositionHandle>,
    pub realized_pnl: Decimal,
    pub order_count: u64,
    pub closed_count: u64,
}

pub struct PaperExecutor {
    state: Arc<RwLock<PaperState>>,
    order_id_counter: AtomicU64,
}

impl Default for PaperExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(PaperState::default())),
            order_id_counter: AtomicU64::new(1),
        }
    }

    pub async fn open_positions(&self) -> Vec<PositionHandle> {
        let state = self.state.read().await;
        let mut positions: Vec<PositionHandle> = state.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.id.cmp(&b.id));
        positions
    }

    pub async fn realized_pnl(&self) -> Decimal {
        self.state.read().await.realized_pnl
    }

    fn next_order_id(&self) -> String {
        format!("PAPER-{}", self.order_id_counter.fetch_add(1, Ordering::SeqCst))
    }
}

/// Signed PnL of a fill pair.
pub fn realized_pnl(side: TradeSide, entry: Decimal, exit: Decimal, quantity: Decimal) -> Decimal {
    match side {
        TradeSide::Buy => (exit - entry) * quantity,
        TradeSide::Sell => (entry - exit) * quantity,
    }
}

#[async_trait]
impl ExecutionClient for PaperExecutor {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn open_position(&self, request: &ExecutionRequest) -> Result<PositionHandle, ExecutionError> {
        if request.entry_price <= Decimal::ZERO || request.quantity <= Decimal::ZERO {
            return Err(ExecutionError::InvalidRequest(format!(
                "{}: price {} quantity {}",
                request.symbol, request.entry_price, request.quantity
            )));
        }

        let mut state = self.state.write().await;
        if state.positions.values().any(|p| p.symbol == request.symbol) {
            return Err(ExecutionError::Rejected {
                symbol: request.symbol.clone(),
                reason: "position already open".to_string(),
            });
        }

        let handle = PositionHandle {
            id: self.next_order_id(),
            symbol: request.symbol.clone(),
            side: request.side,
            strategy: request.strategy,
            filled_price: request.entry_price,
            quantity: request.quantity,
            opened_at: Utc::now(),
        };
        state.positions.insert(handle.id.clone(), handle.clone());
        state.order_count += 1;

        info!(
            "📝 [PAPER] Opened {} {} {} @ {} (notional {})",
            request.side, request.quantity, request.symbol, request.entry_price, request.notional
        );
        Ok(handle)
    }

    async fn close_position(&self, request: &CloseRequest) -> Result<CloseReport, ExecutionError> {
        let mut state = self.state.write().await;
        let handle = state
            .positions
            .remove(&request.handle.id)
            .ok_or_else(|| ExecutionError::UnknownPosition(request.handle.id.clone()))?;

        let pnl = realized_pnl(handle.side, handle.filled_price, request.exit_price, handle.quantity);
        state.realized_pnl += pnl;
        state.closed_count += 1;
        debug!(id = %handle.id, %pnl, total = %state.realized_pnl, "Paper position closed");

        info!(
            "📝 [PAPER] Closed {} @ {} ({:?}) PnL {}",
            handle.symbol, request.exit_price, request.reason, pnl
        );

        Ok(CloseReport {
            position_id: handle.id,
            symbol: handle.symbol,
            exit_price: request.exit_price,
            realized_pnl: pnl,
            closed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::ExitReason;
    use crate::strategy::StrategyKind;
    use rust_decimal_macros::dec;

    fn request(symbol: &str, side: TradeSide) -> ExecutionRequest {
        ExecutionRequest {
            symbol: symbol.to_string(),
            side,
            strategy: StrategyKind::Channel,
            entry_price: dec!(100),
            notional: dec!(500),
            quantity: dec!(5),
            stop_loss: dec!(95),
            take_profit: dec!(110),
        }
    }

    #[tokio::test]
    async fn test_open_and_close_long() {
        let executor = PaperExecutor::new();
        let handle = executor.open_position(&request("BTCUSDT", TradeSide::Buy)).await.unwrap();
        assert_eq!(handle.filled_price, dec!(100));
        assert_eq!(executor.open_positions().await.len(), 1);

        let report = executor
            .close_position(&CloseRequest {
                handle,
                exit_price: dec!(110),
                reason: ExitReason::TakeProfit,
            })
            .await
            .unwrap();

        assert_eq!(report.realized_pnl, dec!(50));
        assert!(report.is_win());
        assert!(executor.open_positions().await.is_empty());
        assert_eq!(executor.realized_pnl().await, dec!(50));
    }

    #[tokio::test]
    async fn test_short_pnl_sign() {
        let executor = PaperExecutor::new();
        let handle = executor.open_position(&request("ETHUSDT", TradeSide::Sell)).await.unwrap();

        let report = executor
            .close_position(&CloseRequest {
                handle,
                exit_price: dec!(104),
                reason: ExitReason::StopLoss,
            })
            .await
            .unwrap();

        assert_eq!(report.realized_pnl, dec!(-20));
        assert!(!report.is_win());
    }

    #[tokio::test]
    async fn test_duplicate_symbol_rejected() {
        let executor = PaperExecutor::new();
        tokio_test::assert_ok!(executor.open_position(&request("BTCUSDT", TradeSide::Buy)).await);

        let err = executor
            .open_position(&request("BTCUSDT", TradeSide::Buy))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_invalid_and_unknown() {
        let executor = PaperExecutor::new();
        let mut bad = request("BTCUSDT", TradeSide::Buy);
        bad.quantity = Decimal::ZERO;
        tokio_test::assert_err!(executor.open_position(&bad).await);

        let ghost = PositionHandle {
            id: "PAPER-404".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: TradeSide::Buy,
            strategy: StrategyKind::Dca,
            filled_price: dec!(100),
            quantity: dec!(1),
            opened_at: Utc::now(),
        };
        let err = executor
            .close_position(&CloseRequest {
                handle: ghost,
                exit_price: dec!(100),
                reason: ExitReason::TimeExit,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnknownPosition(_)));
    }
}
