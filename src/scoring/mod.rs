//! Setup scoring: confidence, win probability and expected value.
//!
//! The scorer implementation is picked once at startup by [`build_scorer`];
//! the orchestrator only ever sees `dyn Scorer`.

mod heuristic;
mod model;

pub use heuristic::HeuristicScorer;
pub use model::{ConfidenceModel, FeatureVector, LinearModel, ModelError, ModelScorer};

use crate::config::{SchedulerConfig, ScorerKind};
use crate::strategy::Setup;
use anyhow::{Context, Result};
use tracing::info;

/// Scorer output for a single setup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreCard {
    pub confidence: f64,
    pub win_probability: f64,
    /// Distance to target as a fraction of entry
    pub expected_profit_pct: f64,
    /// Distance to stop as a fraction of entry
    pub expected_loss_pct: f64,
}

impl ScoreCard {
    pub fn from_setup(setup: &Setup, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let levels = setup.levels();
        Self {
            confidence,
            win_probability: confidence,
            expected_profit_pct: levels.reward_pct(),
            expected_loss_pct: levels.risk_pct(),
        }
    }

    /// Probability-weighted return, scaled by confidence relative to the admission floor.
    pub fn expected_value(&self, min_confidence: f64) -> f64 {
        let p = self.win_probability;
        let raw = p * self.expected_profit_pct - (1.0 - p) * self.expected_loss_pct.abs();
        if min_confidence <= 0.0 {
            return raw;
        }
        raw * (self.confidence / min_confidence)
    }
}

pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, setup: &Setup) -> ScoreCard;
}

/// Construct the configured scorer.
pub fn build_scorer(config: &SchedulerConfig) -> Result<Box<dyn Scorer>> {
    match config.scorer {
        ScorerKind::Heuristic => {
            info!("Using heuristic scorer");
            Ok(Box::new(HeuristicScorer::new()))
        }
        ScorerKind::Model => {
            let path = config
                .model_path
                .as_deref()
                .context("scheduler.model_path is required for the model scorer")?;
            let model = LinearModel::load(path)?;
            info!(path, "Using model scorer");
            Ok(Box::new(ModelScorer::new(model)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketRegime;
    use crate::strategy::{DcaSetup, PriceLevels, SetupPayload, TradeSide};
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn setup(entry: f64, stop: f64, target: f64) -> Setup {
        Setup::new(
            "ETHUSDT",
            TradeSide::Buy,
            PriceLevels {
                entry,
                stop_loss: stop,
                take_profit: target,
            },
            Utc::now(),
            SetupPayload::Dca(DcaSetup {
                drop_pct: -0.06,
                rolling_high: 106.0,
                volume_ratio: None,
                support_levels: Vec::new(),
                regime: MarketRegime::Neutral,
            }),
        )
    }

    #[test]
    fn test_expected_value_scaled_by_confidence() {
        let card = ScoreCard::from_setup(&setup(100.0, 95.0, 108.0), 0.6);

        // (0.6 * 0.08 - 0.4 * 0.05) * (0.6 / 0.5)
        assert_relative_eq!(card.expected_value(0.5), 0.0336, epsilon = 1e-12);
        assert_relative_eq!(card.expected_value(0.0), 0.028, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_expected_value() {
        let card = ScoreCard::from_setup(&setup(100.0, 90.0, 102.0), 0.5);
        assert!(card.expected_value(0.55) < 0.0);
    }

    #[test]
    fn test_build_heuristic_scorer() {
        let scorer = build_scorer(&SchedulerConfig::default()).unwrap();
        assert_eq!(scorer.name(), "heuristic");
    }

    #[test]
    fn test_model_scorer_requires_path() {
        let config = SchedulerConfig {
            scorer: ScorerKind::Model,
            model_path: None,
            ..SchedulerConfig::default()
        };
        assert!(build_scorer(&config).is_err());
    }
}
