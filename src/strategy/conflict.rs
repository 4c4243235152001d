//! Same-symbol conflict resolution between strategies.

use super::signal::{Signal, SignalState};
use crate::config::ConflictPolicy;
use std::collections::HashMap;
use tracing::info;

/// Outcome of conflict resolution. `kept` preserves input order.
#[derive(Debug, Default)]
pub struct ConflictResolution {
    pub kept: Vec<Signal>,
    pub dropped: Vec<Signal>,
    pub paused: Vec<Signal>,
}

/// Resolve signals targeting the same symbol under `policy`.
///
/// Symbols with a single signal pass through untouched.
pub fn resolve_conflicts(signals: Vec<Signal>, policy: ConflictPolicy) -> ConflictResolution {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, signal) in signals.iter().enumerate() {
        groups.entry(signal.symbol().to_string()).or_default().push(idx);
    }

    // Index of the surviving signal per contested symbol; None drops the group
    let mut contested: HashMap<String, Option<usize>> = HashMap::new();
    for (symbol, members) in groups {
        if members.len() < 2 {
            continue;
        }
        let winner = match policy {
            ConflictPolicy::HighestConfidence => members.iter().copied().max_by(|&a, &b| {
                signals[a]
                    .confidence
                    .total_cmp(&signals[b].confidence)
                    .then_with(|| signals[a].priority.total_cmp(&signals[b].priority))
                    // Earlier (higher-ranked) signal wins a full tie
                    .then_with(|| b.cmp(&a))
            }),
            ConflictPolicy::PauseLowerPriority => members.iter().copied().max_by(|&a, &b| {
                signals[a]
                    .priority
                    .total_cmp(&signals[b].priority)
                    .then_with(|| b.cmp(&a))
            }),
            ConflictPolicy::SkipBoth => None,
        };
        contested.insert(symbol, winner);
    }

    let mut resolution = ConflictResolution::default();
    for (idx, signal) in signals.into_iter().enumerate() {
        let Some(winner) = contested.get(signal.symbol()) else {
            resolution.kept.push(signal);
            continue;
        };

        if *winner == Some(idx) {
            resolution.kept.push(signal);
            continue;
        }

        let loser_state = match policy {
            ConflictPolicy::PauseLowerPriority => SignalState::Paused,
            _ => SignalState::ConflictDropped,
        };
        info!(
            symbol = %signal.symbol(),
            strategy = %signal.kind(),
            confidence = signal.confidence,
            ?policy,
            "⚔️ Conflict: signal {}",
            if loser_state == SignalState::Paused { "paused" } else { "dropped" }
        );

        let signal = signal.into_state(loser_state);
        if loser_state == SignalState::Paused {
            resolution.paused.push(signal);
        } else {
            resolution.dropped.push(signal);
        }
    }

    resolution
}
