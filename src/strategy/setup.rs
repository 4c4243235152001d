//! Detector output: an immutable, strategy-tagged trade setup.
//!
//! Every setup carries the same common fields; strategy-specific features
//! live in a closed `SetupPayload` enum so consumers reach them only through
//! an exhaustive match.

use crate::market::MarketRegime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy families competing for capital.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Channel,
    Swing,
    Dca,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [StrategyKind::Channel, StrategyKind::Swing, StrategyKind::Dca];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Channel => "channel",
            StrategyKind::Swing => "swing",
            StrategyKind::Dca => "dca",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Orientation of a fitted channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Horizontal,
    Ascending,
    Descending,
}

/// Channel geometry captured at detection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSetup {
    pub channel_type: ChannelType,
    pub upper: f64,
    pub lower: f64,
    /// Slope per bar, normalised by average price
    pub slope: f64,
    pub width: f64,
    pub strength: f64,
    pub position: f64,
    pub touches_upper: usize,
    pub touches_lower: usize,
}

/// Which path confirmed a swing breakout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutKind {
    Resistance,
    Bollinger,
}

/// Indicator snapshot for the latest bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingFeatures {
    pub close: f64,
    pub fast_ma: f64,
    pub slow_ma: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_crossover: bool,
    pub bb_upper: f64,
    pub bb_lower: f64,
    pub atr: f64,
    pub volume_ratio: f64,
    pub resistance: f64,
    pub support: f64,
    pub momentum: f64,
    pub trend_strength: f64,
    pub dollar_volume_24h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingSetup {
    pub breakout: BreakoutKind,
    /// close / resistance - 1
    pub breakout_strength: f64,
    /// 0-100 additive momentum score
    pub momentum_score: f64,
    pub features: SwingFeatures,
}

/// A rolling-minimum support level for grid placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportLevel {
    pub window_bars: usize,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaSetup {
    /// Fractional drop from the rolling high (negative)
    pub drop_pct: f64,
    pub rolling_high: f64,
    /// Recent / long volume ratio, when the volume filter ran
    pub volume_ratio: Option<f64>,
    pub support_levels: Vec<SupportLevel>,
    pub regime: MarketRegime,
}

/// Strategy-specific setup payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SetupPayload {
    Channel(ChannelSetup),
    Swing(SwingSetup),
    Dca(DcaSetup),
}

impl SetupPayload {
    pub fn kind(&self) -> StrategyKind {
        match self {
            SetupPayload::Channel(_) => StrategyKind::Channel,
            SetupPayload::Swing(_) => StrategyKind::Swing,
            SetupPayload::Dca(_) => StrategyKind::Dca,
        }
    }
}

/// Entry, stop and target for a setup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl PriceLevels {
    /// Distance to target as a fraction of entry.
    pub fn reward_pct(&self) -> f64 {
        if self.entry <= 0.0 {
            return 0.0;
        }
        (self.take_profit - self.entry).abs() / self.entry
    }

    /// Distance to stop as a fraction of entry.
    pub fn risk_pct(&self) -> f64 {
        if self.entry <= 0.0 {
            return 0.0;
        }
        (self.entry - self.stop_loss).abs() / self.entry
    }

    /// Reward-to-risk ratio; zero when the stop sits on the entry.
    pub fn risk_reward(&self) -> f64 {
        let risk = self.risk_pct();
        if risk == 0.0 {
            0.0
        } else {
            self.reward_pct() / risk
        }
    }
}

/// A detected opportunity. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Setup {
    symbol: String,
    side: TradeSide,
    levels: PriceLevels,
    score: f64,
    confidence: f64,
    size_multiplier: f64,
    detected_at: DateTime<Utc>,
    payload: SetupPayload,
}

impl Setup {
    /// Create a setup with neutral score/confidence and full size.
    pub fn new(
        symbol: impl Into<String>,
        side: TradeSide,
        levels: PriceLevels,
        detected_at: DateTime<Utc>,
        payload: SetupPayload,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            levels,
            score: 50.0,
            confidence: 0.5,
            size_multiplier: 1.0,
            detected_at,
            payload,
        }
    }

    /// Quality score, clamped to 0-100.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = clamp_or(score, 0.0, 100.0, 0.0);
        self
    }

    /// Detector-side confidence prior, clamped to 0-1.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_or(confidence, 0.0, 1.0, 0.0);
        self
    }

    /// Position size scaling, clamped to 0-1.
    pub fn with_size_multiplier(mut self, multiplier: f64) -> Self {
        self.size_multiplier = clamp_or(multiplier, 0.0, 1.0, 0.0);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn kind(&self) -> StrategyKind {
        self.payload.kind()
    }

    pub fn side(&self) -> TradeSide {
        self.side
    }

    pub fn levels(&self) -> &PriceLevels {
        &self.levels
    }

    pub fn entry_price(&self) -> f64 {
        self.levels.entry
    }

    pub fn stop_loss(&self) -> f64 {
        self.levels.stop_loss
    }

    pub fn take_profit(&self) -> f64 {
        self.levels.take_profit
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn size_multiplier(&self) -> f64 {
        self.size_multiplier
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    pub fn payload(&self) -> &SetupPayload {
        &self.payload
    }

    pub fn risk_reward(&self) -> f64 {
        self.levels.risk_reward()
    }

    /// Payload as JSON for scan-decision records.
    pub fn feature_snapshot(&self) -> serde_json::Value {
        serde_json::to_value(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}
