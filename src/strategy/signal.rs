//! Scored, time-bounded trade candidates.

use super::setup::{Setup, StrategyKind};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Lifecycle of a signal.
///
/// `Pending` is the only non-terminal pre-execution state. `Executed` moves
/// to `Active` once the position is recorded and `Active` ends in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalState {
    Pending,
    Expired,
    ConflictDropped,
    Paused,
    CapitalRejected,
    Executed,
    Active,
    Closed,
    Failed,
}

impl SignalState {
    pub fn can_transition_to(&self, next: SignalState) -> bool {
        use SignalState::*;
        matches!(
            (self, next),
            (Pending, Expired)
                | (Pending, ConflictDropped)
                | (Pending, Paused)
                | (Pending, CapitalRejected)
                | (Pending, Executed)
                | (Pending, Failed)
                | (Executed, Active)
                | (Active, Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignalState::Pending | SignalState::Executed | SignalState::Active)
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub setup: Setup,
    pub confidence: f64,
    pub expected_value: f64,
    pub required_capital: Decimal,
    pub priority: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    state: SignalState,
}

impl Signal {
    pub fn new(
        setup: Setup,
        confidence: f64,
        expected_value: f64,
        required_capital: Decimal,
        priority: f64,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            setup,
            confidence,
            expected_value,
            required_capital,
            priority,
            created_at,
            expires_at: created_at + ttl,
            state: SignalState::Pending,
        }
    }

    pub fn symbol(&self) -> &str {
        self.setup.symbol()
    }

    pub fn kind(&self) -> StrategyKind {
        self.setup.kind()
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Move to `next`; illegal transitions are refused and logged.
    pub fn transition(&mut self, next: SignalState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                symbol = %self.symbol(),
                from = %self.state,
                to = %next,
                "Illegal signal state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Consume the signal in a terminal or follow-up state.
    pub fn into_state(mut self, next: SignalState) -> Self {
        self.transition(next);
        self
    }
}

/// Sort descending by priority; ties go to higher confidence, then symbol.
pub fn rank_signals(signals: &mut [Signal]) {
    signals.sort_by(|a, b| {
        b.priority
            .total_cmp(&a.priority)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.symbol().cmp(b.symbol()))
    });
}
