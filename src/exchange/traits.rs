//! Venue-agnostic execution trait.
//!
//! The orchestrator talks to brokers only through [`ExecutionClient`], so a
//! paper executor, a live venue and a test mock are interchangeable.

use super::types::{CloseReport, CloseRequest, ExecutionError, ExecutionRequest, PositionHandle};
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Venue name for logging.
    fn name(&self) -> &'static str;

    /// Open a position. Errors leave no position behind.
    async fn open_position(&self, request: &ExecutionRequest) -> Result<PositionHandle, ExecutionError>;

    /// Close a position and report realised PnL.
    async fn close_position(&self, request: &CloseRequest) -> Result<CloseReport, ExecutionError>;
}
