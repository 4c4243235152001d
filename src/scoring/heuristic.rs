use super::{ScoreCard, Scorer};
use crate::strategy::{ChannelSetup, ChannelType, DcaSetup, Setup, SetupPayload, SwingSetup};

/// Residual uncertainty: no heuristic ever claims more than this.
const MAX_CONFIDENCE: f64 = 0.95;

/// Rule-based confidence derived from each payload's own signals.
#[derive(Debug, Clone, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn new() -> Self {
        Self
    }

    /// Strength-driven, with a small bonus for flat channels.
    fn channel_confidence(channel: &ChannelSetup) -> f64 {
        let mut confidence = 0.3 + 0.6 * channel.strength;
        if channel.channel_type == ChannelType::Horizontal {
            confidence += 0.02;
        }
        confidence
    }

    fn swing_confidence(swing: &SwingSetup) -> f64 {
        let f = &swing.features;
        let mut confidence = 0.5;

        confidence += ((f.volume_ratio - 1.0) / 2.0).clamp(0.0, 1.0) * 0.15;
        confidence += (swing.breakout_strength / 0.05).clamp(0.0, 1.0) * 0.15;

        if f.macd > f.macd_signal && (50.0..=70.0).contains(&f.rsi) {
            confidence += 0.1;
        }
        if f.fast_ma > f.slow_ma && f.close > f.fast_ma {
            confidence += 0.1;
        }
        confidence
    }

    /// Regime prior from the detector, nudged by capitulation volume.
    fn dca_confidence(prior: f64, dca: &DcaSetup) -> f64 {
        match dca.volume_ratio {
            Some(ratio) if ratio >= 1.5 => prior + 0.05,
            _ => prior,
        }
    }
}

impl Scorer for HeuristicScorer {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn score(&self, setup: &Setup) -> ScoreCard {
        let confidence = match setup.payload() {
            SetupPayload::Channel(channel) => Self::channel_confidence(channel),
            SetupPayload::Swing(swing) => Self::swing_confidence(swing),
            SetupPayload::Dca(dca) => Self::dca_confidence(setup.confidence(), dca),
        };

        ScoreCard::from_setup(setup, confidence.min(MAX_CONFIDENCE))
    }
}
