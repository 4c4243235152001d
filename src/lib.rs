//! # Opportunity Scheduler
//!
//! Multi-strategy trading-opportunity detection with capital-bounded signal
//! scheduling.
//!
//! ## Architecture
//!
//! - `market`: OHLCV bars, the market-data boundary and regime classification
//! - `detector`: Channel, swing and DCA opportunity detectors plus indicators
//! - `scoring`: Heuristic and model-backed confidence scoring
//! - `strategy`: Signals, conflicts, capital pools and the orchestrator
//! - `exchange`: Execution boundary and the paper executor
//! - `risk`: Exit conditions for open positions
//! - `persistence`: SQLite scan-decision and trade store
//! - `config`: Configuration management and validation
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod detector;
pub mod exchange;
pub mod market;
pub mod persistence;
pub mod risk;
pub mod scoring;
pub mod strategy;
pub mod utils;

pub use config::Config;
