//! Coarse market regime classification.
//!
//! The regime is computed once per scan cycle from a reference asset and is
//! used two ways: as a hard stop / capital multiplier for the whole cycle, and
//! as the gate for DCA setups.

use super::bar::Bar;
use crate::config::RegimeConfig;
use crate::detector::indicators;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Market condition classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    Bull,
    Bear,
    #[default]
    Neutral,
    Crash,
    Panic,
    Caution,
    Euphoria,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarketRegime::Bull => "BULL",
            MarketRegime::Bear => "BEAR",
            MarketRegime::Neutral => "NEUTRAL",
            MarketRegime::Crash => "CRASH",
            MarketRegime::Panic => "PANIC",
            MarketRegime::Caution => "CAUTION",
            MarketRegime::Euphoria => "EUPHORIA",
        };
        write!(f, "{}", name)
    }
}

impl MarketRegime {
    /// PANIC halts every new signal for the cycle.
    pub fn halts_trading(&self) -> bool {
        matches!(self, MarketRegime::Panic)
    }

    /// Global multiplier applied to required capital and position size.
    pub fn capital_multiplier(&self, config: &RegimeConfig) -> Decimal {
        match self {
            MarketRegime::Caution => config.caution_multiplier,
            MarketRegime::Euphoria => config.euphoria_multiplier,
            MarketRegime::Panic => Decimal::ZERO,
            _ => Decimal::ONE,
        }
    }
}

/// Classifies the regime from a reference asset's bars.
#[derive(Debug, Clone)]
pub struct RegimeDetector {
    config: RegimeConfig,
}

impl RegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    /// Classify, defaulting to NEUTRAL when the reference series is missing.
    pub fn classify_or_neutral(&self, bars: Option<&[Bar]>) -> MarketRegime {
        match bars {
            Some(bars) => self.classify(bars),
            None => {
                warn!("Reference bars unavailable, defaulting regime to NEUTRAL");
                MarketRegime::Neutral
            }
        }
    }

    /// Classify the regime. Never fails: unusable data yields NEUTRAL.
    pub fn classify(&self, bars: &[Bar]) -> MarketRegime {
        let window = self.config.change_window_bars;
        let required = self.config.long_ma.max(window + 1);
        if bars.len() < required {
            warn!(
                bars = bars.len(),
                required, "Insufficient reference history, defaulting regime to NEUTRAL"
            );
            return MarketRegime::Neutral;
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        if closes.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            warn!("Non-finite reference prices, defaulting regime to NEUTRAL");
            return MarketRegime::Neutral;
        }

        let Some(change_24h) = indicators::pct_change(&closes, window) else {
            return MarketRegime::Neutral;
        };

        if change_24h <= -self.config.panic_drop {
            return self.log_regime(MarketRegime::Panic, change_24h);
        }
        if change_24h <= -self.config.crash_drop {
            return self.log_regime(MarketRegime::Crash, change_24h);
        }
        if change_24h >= self.config.euphoria_gain {
            return self.log_regime(MarketRegime::Euphoria, change_24h);
        }

        let recent = &closes[closes.len() - window - 1..];
        let returns: Vec<f64> = recent.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
        if indicators::std_dev(&returns) >= self.config.caution_volatility {
            return self.log_regime(MarketRegime::Caution, change_24h);
        }

        let price = closes[closes.len() - 1];
        let short = indicators::last_value(&indicators::sma(&closes, self.config.short_ma));
        let long = indicators::last_value(&indicators::sma(&closes, self.config.long_ma));
        let regime = match (short, long) {
            (Some(short), Some(long)) if price > short && short > long => MarketRegime::Bull,
            (Some(short), Some(long)) if price < short && short < long => MarketRegime::Bear,
            _ => MarketRegime::Neutral,
        };

        self.log_regime(regime, change_24h)
    }

    fn log_regime(&self, regime: MarketRegime, change_24h: f64) -> MarketRegime {
        debug!(%regime, change_24h, "Market regime classified");
        regime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(start + Duration::hours(i as i64), c, c, c, c, 1000.0))
            .collect()
    }

    fn detector() -> RegimeDetector {
        RegimeDetector::new(RegimeConfig::default())
    }

    #[test]
    fn test_steady_uptrend_is_bull() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 * (1.0 + 0.001 * i as f64)).collect();
        assert_eq!(detector().classify(&bars_from_closes(&closes)), MarketRegime::Bull);
    }

    #[test]
    fn test_steady_downtrend_is_bear() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 * (1.0 - 0.001 * i as f64)).collect();
        assert_eq!(detector().classify(&bars_from_closes(&closes)), MarketRegime::Bear);
    }

    #[test]
    fn test_sharp_drop_is_crash_or_panic() {
        let mut closes = vec![100.0; 60];
        closes.extend((1..=24).map(|i| 100.0 - 0.5 * i as f64)); // -12% over a day
        assert_eq!(detector().classify(&bars_from_closes(&closes)), MarketRegime::Crash);

        let mut closes = vec![100.0; 60];
        closes.extend((1..=24).map(|i| 100.0 - i as f64)); // -24%
        assert_eq!(detector().classify(&bars_from_closes(&closes)), MarketRegime::Panic);
    }

    #[test]
    fn test_rally_is_euphoria() {
        let mut closes = vec![100.0; 60];
        closes.extend((1..=24).map(|i| 100.0 + i as f64)); // +24%
        assert_eq!(
            detector().classify(&bars_from_closes(&closes)),
            MarketRegime::Euphoria
        );
    }

    #[test]
    fn test_choppy_market_is_caution() {
        let closes: Vec<f64> = (0..80).map(|i| if i % 2 == 0 { 100.0 } else { 106.0 }).collect();
        assert_eq!(
            detector().classify(&bars_from_closes(&closes)),
            MarketRegime::Caution
        );
    }

    #[test]
    fn test_insufficient_history_defaults_neutral() {
        let closes = vec![100.0; 10];
        assert_eq!(
            detector().classify(&bars_from_closes(&closes)),
            MarketRegime::Neutral
        );
        assert_eq!(detector().classify_or_neutral(None), MarketRegime::Neutral);
    }

    #[test]
    fn test_capital_multipliers() {
        let config = RegimeConfig::default();
        assert_eq!(MarketRegime::Caution.capital_multiplier(&config), dec!(0.5));
        assert_eq!(MarketRegime::Euphoria.capital_multiplier(&config), dec!(0.7));
        assert_eq!(MarketRegime::Bull.capital_multiplier(&config), Decimal::ONE);
        assert!(MarketRegime::Panic.halts_trading());
    }
}
