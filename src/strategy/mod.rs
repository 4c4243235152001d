//! Strategy scheduling.
//!
//! Contains the core logic for:
//! - The setup and signal model shared by every detector
//! - Same-symbol conflict resolution
//! - Per-strategy capital pools and the open-position book
//! - Performance feedback into signal priority
//! - The orchestrating `StrategyManager`

mod conflict;
mod ledger;
mod manager;
mod performance;
mod positions;
mod setup;
mod signal;

#[cfg(test)]
pub(crate) mod testing;

pub use conflict::{resolve_conflicts, ConflictResolution};
pub use ledger::{AllocationPool, CapitalLedger};
pub use manager::{
    priority_score, Admission, ClosedPosition, CycleSummary, ExecutionSummary, ScanOutcome,
    StrategyManager,
};
pub use performance::{PerformanceTracker, StrategyStats, PRIOR_WIN_RATE};
pub use positions::{ActivePosition, PositionBook};
pub use setup::{
    BreakoutKind, ChannelSetup, ChannelType, DcaSetup, PriceLevels, Setup, SetupPayload,
    StrategyKind, SupportLevel, SwingFeatures, SwingSetup, TradeSide,
};
pub use signal::{rank_signals, Signal, SignalState};
