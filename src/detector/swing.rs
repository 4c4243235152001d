//! Breakout / momentum swing setups.

use super::indicators;
use crate::config::SwingConfig;
use crate::market::{Bar, BarColumns};
use crate::strategy::{BreakoutKind, PriceLevels, Setup, SetupPayload, SwingFeatures, SwingSetup, TradeSide};
use tracing::{debug, trace};

pub struct SwingDetector {
    config: SwingConfig,
}

impl SwingDetector {
    pub fn new(config: SwingConfig) -> Self {
        Self { config }
    }

    /// Bars required before every indicator is defined.
    pub fn min_bars(&self) -> usize {
        let cfg = &self.config;
        [
            cfg.fast_ma,
            cfg.slow_ma,
            cfg.macd_slow + cfg.macd_signal,
            cfg.bb_period,
            cfg.rsi_period + 1,
            cfg.atr_period + 1,
            cfg.volume_ma + 1,
            cfg.resistance_lookback + 1,
            cfg.momentum_lookback + 1,
            cfg.dollar_volume_bars,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Indicator snapshot for the latest bar.
    pub fn features(&self, bars: &[Bar]) -> Option<SwingFeatures> {
        let cfg = &self.config;
        if bars.len() < self.min_bars() {
            return None;
        }

        let cols = BarColumns::from_bars(bars);
        let n = cols.close.len();
        let close = cols.close[n - 1];

        let fast_ma = indicators::last_value(&indicators::ema(&cols.close, cfg.fast_ma))?;
        let slow_ma = indicators::last_value(&indicators::sma(&cols.close, cfg.slow_ma))?;
        let rsi = indicators::last_value(&indicators::rsi(&cols.close, cfg.rsi_period))?;

        let (macd_line, signal_line) =
            indicators::macd(&cols.close, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let macd = indicators::last_value(&macd_line)?;
        let macd_signal = indicators::last_value(&signal_line)?;
        let macd_crossover = match (
            indicators::previous_value(&macd_line),
            indicators::previous_value(&signal_line),
        ) {
            (Some(prev_macd), Some(prev_signal)) => prev_macd <= prev_signal && macd > macd_signal,
            _ => false,
        };

        let (bb_upper, _, bb_lower) = indicators::bollinger_bands(&cols.close, cfg.bb_period, cfg.bb_std);
        let bb_upper = indicators::last_value(&bb_upper)?;
        let bb_lower = indicators::last_value(&bb_lower)?;
        let atr = indicators::last_value(&indicators::atr(&cols.high, &cols.low, &cols.close, cfg.atr_period))?;

        let volume_avg = indicators::mean(&cols.volume[n - 1 - cfg.volume_ma..n - 1]);
        let volume_ratio = if volume_avg > 0.0 {
            cols.volume[n - 1] / volume_avg
        } else {
            0.0
        };

        let resistance = indicators::prior_max(&cols.high, n - 1, cfg.resistance_lookback)?;
        let support = indicators::prior_min(&cols.low, n - 1, cfg.resistance_lookback)?;
        let momentum = indicators::pct_change(&cols.close, cfg.momentum_lookback)?;
        let trend_strength = if slow_ma != 0.0 {
            (fast_ma - slow_ma) / slow_ma
        } else {
            0.0
        };

        let day = n - cfg.dollar_volume_bars;
        let dollar_volume_24h = cols.close[day..]
            .iter()
            .zip(&cols.volume[day..])
            .map(|(c, v)| c * v)
            .sum();

        Some(SwingFeatures {
            close,
            fast_ma,
            slow_ma,
            rsi,
            macd,
            macd_signal,
            macd_crossover,
            bb_upper,
            bb_lower,
            atr,
            volume_ratio,
            resistance,
            support,
            momentum,
            trend_strength,
            dollar_volume_24h,
        })
    }

    pub fn detect_setup(&self, symbol: &str, bars: &[Bar]) -> Option<Setup> {
        let cfg = &self.config;
        let Some(features) = self.features(bars) else {
            trace!(%symbol, bars = bars.len(), "Not enough bars for swing detection");
            return None;
        };

        if let Some(reason) = self.risk_rejection(&features) {
            debug!(%symbol, reason, "Swing setup rejected by risk gate");
            return None;
        }

        let Some(breakout) = self.breakout_kind(&features) else {
            trace!(%symbol, close = features.close, resistance = features.resistance, "No breakout");
            return None;
        };

        let entry = features.close;
        let breakout_strength = if features.resistance > 0.0 {
            entry / features.resistance - 1.0
        } else {
            0.0
        };
        let momentum_score = self.momentum_score(&features);

        let breakout_points = (breakout_strength / 0.05).clamp(0.0, 1.0) * 100.0;
        let volume_points = (features.volume_ratio / 3.0).min(1.0) * 100.0;
        let score = 0.4 * breakout_points + 0.4 * momentum_score + 0.2 * volume_points;

        let stop_loss = self.stop_loss(entry, &features);
        let atr_target = entry + cfg.atr_target_multiplier * features.atr;
        let measured_move = entry + (features.resistance - features.support);
        let take_profit = ((atr_target + measured_move) / 2.0).max(entry * (1.0 + cfg.min_target_pct));

        debug!(
            %symbol,
            breakout = ?breakout,
            score,
            momentum_score,
            volume_ratio = features.volume_ratio,
            rsi = features.rsi,
            "Swing setup detected"
        );

        let setup = Setup::new(
            symbol,
            TradeSide::Buy,
            PriceLevels {
                entry,
                stop_loss,
                take_profit,
            },
            bars[bars.len() - 1].timestamp,
            SetupPayload::Swing(SwingSetup {
                breakout,
                breakout_strength,
                momentum_score,
                features,
            }),
        )
        .with_score(score)
        .with_confidence(score / 100.0);

        Some(setup)
    }

    fn risk_rejection(&self, features: &SwingFeatures) -> Option<&'static str> {
        let cfg = &self.config;
        if features.close <= 0.0 || features.atr / features.close > cfg.max_volatility {
            return Some("volatility");
        }
        if features.dollar_volume_24h < cfg.min_dollar_volume {
            return Some("liquidity");
        }
        if features.rsi > cfg.rsi_extreme {
            return Some("overbought");
        }
        None
    }

    fn breakout_kind(&self, f: &SwingFeatures) -> Option<BreakoutKind> {
        let cfg = &self.config;
        let volume_confirmed = f.volume_ratio > cfg.volume_spike;

        if f.close > f.resistance * cfg.breakout_threshold && volume_confirmed && f.rsi > cfg.rsi_bullish_floor {
            return Some(BreakoutKind::Resistance);
        }
        if f.close > f.bb_upper && volume_confirmed && f.rsi >= cfg.bb_rsi_min && f.rsi <= cfg.bb_rsi_max {
            return Some(BreakoutKind::Bollinger);
        }
        None
    }

    fn momentum_score(&self, f: &SwingFeatures) -> f64 {
        let cfg = &self.config;
        let mut score = 0.0;
        if f.rsi >= cfg.bb_rsi_min && f.rsi <= cfg.bb_rsi_max {
            score += 30.0;
        }
        if f.macd_crossover {
            score += 40.0;
        }
        if f.momentum > cfg.momentum_threshold {
            score += 30.0;
        }
        score
    }

    /// Tightest of ATR stop, support and fast MA below entry, at least `min_stop_pct` away.
    fn stop_loss(&self, entry: f64, f: &SwingFeatures) -> f64 {
        let cfg = &self.config;
        let ceiling = entry * (1.0 - cfg.min_stop_pct);
        let atr_stop = entry - cfg.atr_stop_multiplier * f.atr;

        [atr_stop, f.support, f.fast_ma]
            .into_iter()
            .filter(|level| *level < entry && *level > 0.0)
            .reduce(f64::max)
            .map_or(ceiling, |tightest| tightest.min(ceiling))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    // ==================== Test Helpers ====================

    fn bars_from(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| Bar::new(start + Duration::hours(i as i64), c, c + 0.5, c - 0.5, c, v))
            .collect()
    }

    /// 99 bars chopping between 100 and 101, then a high-volume close at 104.
    fn breakout_bars() -> Vec<Bar> {
        let mut closes: Vec<f64> = (0..99).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        closes.push(104.0);
        let mut volumes = vec![1000.0; 99];
        volumes.push(3000.0);
        bars_from(&closes, &volumes)
    }

    fn detector() -> SwingDetector {
        SwingDetector::new(SwingConfig::default())
    }

    // ==================== Features ====================

    #[test]
    fn test_features_exclude_current_bar_from_levels() {
        let features = detector().features(&breakout_bars()).unwrap();

        assert_relative_eq!(features.resistance, 101.5);
        assert_relative_eq!(features.support, 99.5);
        assert_relative_eq!(features.volume_ratio, 3.0);
        assert!(features.rsi > 55.0 && features.rsi < 65.0);
        assert!(features.macd_crossover);
        assert!(features.trend_strength > 0.0);
    }

    // ==================== Detection ====================

    #[test]
    fn test_resistance_breakout_detected() {
        let setup = detector().detect_setup("SOLUSDT", &breakout_bars()).unwrap();

        assert_eq!(setup.side(), TradeSide::Buy);
        assert_relative_eq!(setup.entry_price(), 104.0);
        // Fast EMA is the tightest level below entry
        assert_relative_eq!(setup.stop_loss(), 100.81, epsilon = 0.05);
        assert!(setup.stop_loss() <= 104.0 * 0.98);
        // Mean of ATR target (~109.1) and measured move (106)
        assert_relative_eq!(setup.take_profit(), 107.57, epsilon = 0.05);
        assert!(setup.score() > 70.0 && setup.score() <= 100.0);

        match setup.payload() {
            SetupPayload::Swing(swing) => {
                assert_eq!(swing.breakout, BreakoutKind::Resistance);
                assert_relative_eq!(swing.momentum_score, 100.0);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_no_breakout_in_range() {
        let closes: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let bars = bars_from(&closes, &vec![1000.0; 100]);
        assert!(detector().detect_setup("SOLUSDT", &bars).is_none());
    }

    #[test]
    fn test_breakout_without_volume_rejected() {
        let mut closes: Vec<f64> = (0..99).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        closes.push(104.0);
        let bars = bars_from(&closes, &vec![1000.0; 100]);
        assert!(detector().detect_setup("SOLUSDT", &bars).is_none());
    }

    #[test]
    fn test_overbought_rejected() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64 * 0.5).collect();
        let mut volumes = vec![1000.0; 99];
        volumes.push(5000.0);
        let bars = bars_from(&closes, &volumes);
        assert!(detector().detect_setup("SOLUSDT", &bars).is_none());
    }

    #[test]
    fn test_illiquid_symbol_rejected() {
        let detector = SwingDetector::new(SwingConfig {
            min_dollar_volume: 5_000_000.0,
            ..SwingConfig::default()
        });
        assert!(detector.detect_setup("SOLUSDT", &breakout_bars()).is_none());
    }

    #[test]
    fn test_short_history_returns_none() {
        let bars = breakout_bars();
        assert!(detector().detect_setup("SOLUSDT", &bars[60..]).is_none());
    }
}
