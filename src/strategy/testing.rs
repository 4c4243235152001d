//! Builders shared by the strategy tests.

use super::*;
use crate::market::MarketRegime;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

pub fn payload(kind: StrategyKind) -> SetupPayload {
    match kind {
        StrategyKind::Channel => SetupPayload::Channel(ChannelSetup {
            channel_type: ChannelType::Horizontal,
            upper: 110.0,
            lower: 99.0,
            slope: 0.0,
            width: 0.1,
            strength: 0.8,
            position: 0.1,
            touches_upper: 4,
            touches_lower: 4,
        }),
        StrategyKind::Swing => SetupPayload::Swing(SwingSetup {
            breakout: BreakoutKind::Resistance,
            breakout_strength: 0.025,
            momentum_score: 70.0,
            features: SwingFeatures {
                close: 100.0,
                fast_ma: 98.0,
                slow_ma: 96.0,
                rsi: 62.0,
                macd: 0.4,
                macd_signal: 0.2,
                macd_crossover: true,
                bb_upper: 101.0,
                bb_lower: 95.0,
                atr: 1.5,
                volume_ratio: 2.0,
                resistance: 97.5,
                support: 94.0,
                momentum: 0.03,
                trend_strength: 0.02,
                dollar_volume_24h: 5_000_000.0,
            },
        }),
        StrategyKind::Dca => SetupPayload::Dca(DcaSetup {
            drop_pct: -0.07,
            rolling_high: 107.5,
            volume_ratio: Some(1.0),
            support_levels: vec![SupportLevel {
                window_bars: 4,
                price: 98.0,
            }],
            regime: MarketRegime::Neutral,
        }),
    }
}

/// Long setup at 100 with a 5% stop and 10% target.
pub fn setup(symbol: &str, kind: StrategyKind, detected_at: DateTime<Utc>) -> Setup {
    Setup::new(
        symbol,
        TradeSide::Buy,
        PriceLevels {
            entry: 100.0,
            stop_loss: 95.0,
            take_profit: 110.0,
        },
        detected_at,
        payload(kind),
    )
}

pub fn signal(
    symbol: &str,
    kind: StrategyKind,
    confidence: f64,
    priority: f64,
    required_capital: Decimal,
) -> Signal {
    let now = Utc::now();
    Signal::new(
        setup(symbol, kind, now),
        confidence,
        0.03,
        required_capital,
        priority,
        now,
        Duration::minutes(30),
    )
}
