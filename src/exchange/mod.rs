//! Execution boundary.
//!
//! Admitted signals leave the scheduler as [`ExecutionRequest`]s; exits come
//! back as [`CloseReport`]s carrying realised PnL.

pub mod mock;
mod traits;
mod types;

pub use mock::PaperExecutor;
pub use traits::ExecutionClient;
#[cfg(test)]
pub use traits::MockExecutionClient;
pub use types::*;
