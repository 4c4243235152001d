//! Opportunity detectors.
//!
//! Each detector is a pure function of its config and the bars it is given,
//! so the orchestrator can run them across symbols in parallel.

pub mod indicators;

mod channel;
mod dca;
mod swing;

pub use channel::{Channel, ChannelDetector, ChannelTargets};
pub use dca::DcaDetector;
pub use swing::SwingDetector;
