use super::{HeuristicScorer, ScoreCard, Scorer};
use crate::market::MarketRegime;
use crate::strategy::{Setup, SetupPayload, StrategyKind};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no weights for {0} setups")]
    MissingWeights(StrategyKind),

    #[error("expected {expected} weights, found {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("model output out of range: {0}")]
    InvalidOutput(f64),
}

/// Fixed-layout model input derived from a setup.
///
/// Slots 0-4 are common to every strategy; slots 5-7 are strategy-specific
/// (channel: strength, position, width; swing: rsi/100, volume ratio,
/// breakout strength; dca: drop, volume ratio, bull-regime flag).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub kind: StrategyKind,
    pub values: [f64; FeatureVector::LEN],
}

impl FeatureVector {
    pub const LEN: usize = 8;

    pub fn from_setup(setup: &Setup) -> Self {
        let levels = setup.levels();
        let specific = match setup.payload() {
            SetupPayload::Channel(c) => [c.strength, c.position, c.width],
            SetupPayload::Swing(s) => [s.features.rsi / 100.0, s.features.volume_ratio, s.breakout_strength],
            SetupPayload::Dca(d) => [
                d.drop_pct,
                d.volume_ratio.unwrap_or(1.0),
                if d.regime == MarketRegime::Bull { 1.0 } else { 0.0 },
            ],
        };

        Self {
            kind: setup.kind(),
            values: [
                setup.score() / 100.0,
                setup.confidence(),
                setup.risk_reward(),
                levels.reward_pct(),
                levels.risk_pct(),
                specific[0],
                specific[1],
                specific[2],
            ],
        }
    }
}

/// A learned win-probability model.
pub trait ConfidenceModel: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct KindWeights {
    pub bias: f64,
    pub weights: Vec<f64>,
}

/// Per-strategy logistic regression loaded from a JSON weights file.
///
/// ```json
/// { "swing": { "bias": -0.4, "weights": [0.8, 1.2, 0.1, 2.0, -3.0, 0.5, 0.1, 1.5] } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub channel: Option<KindWeights>,
    #[serde(default)]
    pub swing: Option<KindWeights>,
    #[serde(default)]
    pub dca: Option<KindWeights>,
}

impl LinearModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model weights: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid model weights: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    fn weights_for(&self, kind: StrategyKind) -> Option<&KindWeights> {
        match kind {
            StrategyKind::Channel => self.channel.as_ref(),
            StrategyKind::Swing => self.swing.as_ref(),
            StrategyKind::Dca => self.dca.as_ref(),
        }
    }
}

impl ConfidenceModel for LinearModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
        let kind_weights = self
            .weights_for(features.kind)
            .ok_or(ModelError::MissingWeights(features.kind))?;
        if kind_weights.weights.len() != FeatureVector::LEN {
            return Err(ModelError::Shape {
                expected: FeatureVector::LEN,
                actual: kind_weights.weights.len(),
            });
        }

        let z = kind_weights.bias
            + kind_weights
                .weights
                .iter()
                .zip(features.values.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

/// Scores with a learned model, falling back to heuristics per setup on error.
pub struct ModelScorer<M: ConfidenceModel> {
    model: M,
    fallback: HeuristicScorer,
}

impl<M: ConfidenceModel> ModelScorer<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            fallback: HeuristicScorer::new(),
        }
    }

    fn predict(&self, setup: &Setup) -> Result<f64, ModelError> {
        let p = self.model.predict(&FeatureVector::from_setup(setup))?;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ModelError::InvalidOutput(p));
        }
        Ok(p)
    }
}

impl<M: ConfidenceModel> Scorer for ModelScorer<M> {
    fn name(&self) -> &'static str {
        "model"
    }

    fn score(&self, setup: &Setup) -> ScoreCard {
        match self.predict(setup) {
            Ok(p) => ScoreCard::from_setup(setup, p),
            Err(e) => {
                warn!(symbol = %setup.symbol(), strategy = %setup.kind(), error = %e, "Model scoring failed, using heuristic");
                self.fallback.score(setup)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{DcaSetup, PriceLevels, TradeSide};
    use approx::assert_relative_eq;
    use chrono::Utc;

    struct FixedModel(Result<f64, ()>);

    impl ConfidenceModel for FixedModel {
        fn predict(&self, features: &FeatureVector) -> Result<f64, ModelError> {
            self.0.map_err(|_| ModelError::MissingWeights(features.kind))
        }
    }

    fn dca_setup() -> Setup {
        Setup::new(
            "ETHUSDT",
            TradeSide::Buy,
            PriceLevels {
                entry: 100.0,
                stop_loss: 95.0,
                take_profit: 108.0,
            },
            Utc::now(),
            SetupPayload::Dca(DcaSetup {
                drop_pct: -0.06,
                rolling_high: 106.4,
                volume_ratio: Some(1.1),
                support_levels: Vec::new(),
                regime: MarketRegime::Bull,
            }),
        )
        .with_score(72.0)
        .with_confidence(0.60)
    }

    #[test]
    fn test_feature_vector_layout() {
        let features = FeatureVector::from_setup(&dca_setup());

        assert_eq!(features.kind, StrategyKind::Dca);
        assert_relative_eq!(features.values[0], 0.72);
        assert_relative_eq!(features.values[2], 1.6, epsilon = 1e-9);
        assert_relative_eq!(features.values[5], -0.06);
        assert_relative_eq!(features.values[7], 1.0);
    }

    #[test]
    fn test_model_prediction_used() {
        let scorer = ModelScorer::new(FixedModel(Ok(0.81)));
        let card = scorer.score(&dca_setup());
        assert_relative_eq!(card.confidence, 0.81);
    }

    #[test]
    fn test_model_error_falls_back() {
        let setup = dca_setup();
        let expected = HeuristicScorer::new().score(&setup);

        assert_eq!(ModelScorer::new(FixedModel(Err(()))).score(&setup), expected);
        assert_eq!(ModelScorer::new(FixedModel(Ok(1.7))).score(&setup), expected);
    }

    #[test]
    fn test_linear_model_logistic_output() {
        let model = LinearModel::from_json(
            r#"{ "dca": { "bias": 0.0, "weights": [0, 0, 0, 0, 0, 0, 0, 0] } }"#,
        )
        .unwrap();
        let features = FeatureVector::from_setup(&dca_setup());
        assert_relative_eq!(model.predict(&features).unwrap(), 0.5);

        let no_swing = FeatureVector {
            kind: StrategyKind::Swing,
            ..features.clone()
        };
        assert!(matches!(model.predict(&no_swing), Err(ModelError::MissingWeights(StrategyKind::Swing))));
    }

    #[test]
    fn test_linear_model_shape_checked() {
        let model = LinearModel::from_json(r#"{ "dca": { "bias": 0.1, "weights": [1.0] } }"#).unwrap();
        let features = FeatureVector::from_setup(&dca_setup());
        assert!(matches!(model.predict(&features), Err(ModelError::Shape { .. })));
    }
}
