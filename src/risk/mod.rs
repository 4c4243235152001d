//! Position risk: exit conditions for open positions.
//!
//! Entry-side risk (pool ceilings, one position per symbol) lives in the
//! strategy ledger and position book.

mod exit;

pub use exit::{ExitMonitor, ExitReason, ExitSignal};
