//! Parallel price channel detection.
//!
//! Fits least-squares lines through local highs and lows, validates that the
//! two lines form a usable channel and derives a trading zone and targets
//! from the latest close's position inside it.

use super::indicators::{self, LineFit};
use crate::config::ChannelConfig;
use crate::market::{Bar, BarColumns};
use crate::strategy::{ChannelSetup, ChannelType, PriceLevels, Setup, SetupPayload, TradeSide};
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// A validated channel over the most recent bars.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub channel_type: ChannelType,
    /// Upper line value at the latest bar
    pub upper: f64,
    /// Lower line value at the latest bar
    pub lower: f64,
    /// Average of the two fitted slopes, normalised by average close
    pub slope: f64,
    /// (upper - lower) / average close
    pub width: f64,
    pub touches_upper: usize,
    pub touches_lower: usize,
    pub strength: f64,
    /// 0 = lower line, 1 = upper line
    pub position: f64,
    pub close: f64,
    pub timestamp: DateTime<Utc>,
    pub upper_line: LineFit,
    pub lower_line: LineFit,
}

impl Channel {
    pub fn to_payload(&self) -> ChannelSetup {
        ChannelSetup {
            channel_type: self.channel_type,
            upper: self.upper,
            lower: self.lower,
            slope: self.slope,
            width: self.width,
            strength: self.strength,
            position: self.position,
            touches_upper: self.touches_upper,
            touches_lower: self.touches_lower,
        }
    }
}

/// Stop and target for a channel trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelTargets {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
}

pub struct ChannelDetector {
    config: ChannelConfig,
}

impl ChannelDetector {
    pub fn new(config: ChannelConfig) -> Self {
        Self { config }
    }

    /// Detect a valid channel over the last `lookback_bars` bars.
    pub fn detect_channel(&self, symbol: &str, bars: &[Bar]) -> Option<Channel> {
        let cfg = &self.config;
        if bars.len() < cfg.lookback_bars || cfg.lookback_bars < 2 * cfg.extrema_window + 1 {
            trace!(%symbol, bars = bars.len(), "Not enough bars for channel detection");
            return None;
        }

        let window = &bars[bars.len() - cfg.lookback_bars..];
        let cols = BarColumns::from_bars(window);
        let n = window.len();
        let avg_close = indicators::mean(&cols.close);
        if avg_close <= 0.0 {
            return None;
        }

        let (highs, lows) = self.local_extrema(&cols);
        if highs.len() < cfg.min_touches || lows.len() < cfg.min_touches {
            trace!(%symbol, highs = highs.len(), lows = lows.len(), "Too few extrema");
            return None;
        }

        let upper_line = LineFit::fit(&highs).filter(|fit| self.line_accepted(fit));
        let lower_line = LineFit::fit(&lows).filter(|fit| self.line_accepted(fit));
        let (Some(upper_line), Some(lower_line)) = (upper_line, lower_line) else {
            trace!(%symbol, "Boundary fit rejected");
            return None;
        };

        let upper_slope = upper_line.slope / avg_close;
        let lower_slope = lower_line.slope / avg_close;
        if !self.is_parallel(upper_slope, lower_slope) {
            trace!(%symbol, upper_slope, lower_slope, "Boundaries not parallel");
            return None;
        }

        let last = (n - 1) as f64;
        let upper = upper_line.value_at(last);
        let lower = lower_line.value_at(last);
        if upper <= lower {
            return None;
        }

        let width = (upper - lower) / avg_close;
        if width < cfg.min_width || width > cfg.max_width {
            trace!(%symbol, width, "Channel width out of range");
            return None;
        }

        let tol = cfg.touch_tolerance;
        let mut touches_upper = 0;
        let mut touches_lower = 0;
        let mut contained = 0;
        for i in 0..n {
            let up = upper_line.value_at(i as f64);
            let lo = lower_line.value_at(i as f64);
            if up > 0.0 && ((cols.high[i] - up) / up).abs() <= tol {
                touches_upper += 1;
            }
            if lo > 0.0 && ((cols.low[i] - lo) / lo).abs() <= tol {
                touches_lower += 1;
            }
            if cols.high[i] <= up * (1.0 + tol) && cols.low[i] >= lo * (1.0 - tol) {
                contained += 1;
            }
        }

        if touches_upper < cfg.min_touches || touches_lower < cfg.min_touches {
            trace!(%symbol, touches_upper, touches_lower, "Too few boundary touches");
            return None;
        }

        let touch_score = ((touches_upper + touches_lower) as f64 / 10.0).min(1.0);
        let containment = contained as f64 / n as f64;
        let consistency = self.width_consistency(&upper_line, &lower_line, n);
        let strength = 0.4 * touch_score + 0.4 * containment + 0.2 * consistency;
        if strength <= cfg.min_strength {
            debug!(%symbol, strength, "Channel too weak");
            return None;
        }

        let close = cols.close[n - 1];
        let position = ((close - lower) / (upper - lower)).clamp(0.0, 1.0);
        let slope = (upper_slope + lower_slope) / 2.0;
        let channel_type = if slope.abs() < cfg.flat_slope {
            ChannelType::Horizontal
        } else if slope > 0.0 {
            ChannelType::Ascending
        } else {
            ChannelType::Descending
        };

        Some(Channel {
            channel_type,
            upper,
            lower,
            slope,
            width,
            touches_upper,
            touches_lower,
            strength,
            position,
            close,
            timestamp: window[n - 1].timestamp,
            upper_line,
            lower_line,
        })
    }

    /// BUY near the lower boundary, SELL near the upper one.
    pub fn trading_signal(&self, channel: &Channel) -> Option<TradeSide> {
        if channel.position <= self.config.buy_zone {
            Some(TradeSide::Buy)
        } else if channel.position >= self.config.sell_zone {
            Some(TradeSide::Sell)
        } else {
            None
        }
    }

    /// Target the opposite boundary; stop just beyond the near one.
    pub fn calculate_targets(&self, channel: &Channel, entry: f64, side: TradeSide) -> ChannelTargets {
        let buffer = self.config.stop_buffer;
        let (stop_loss, take_profit) = match side {
            TradeSide::Buy => (channel.lower * (1.0 - buffer), channel.upper),
            TradeSide::Sell => (channel.upper * (1.0 + buffer), channel.lower),
        };
        let levels = PriceLevels {
            entry,
            stop_loss,
            take_profit,
        };

        ChannelTargets {
            stop_loss,
            take_profit,
            risk_reward: levels.risk_reward(),
        }
    }

    pub fn detect_setup(&self, symbol: &str, bars: &[Bar]) -> Option<Setup> {
        let channel = self.detect_channel(symbol, bars)?;
        let Some(side) = self.trading_signal(&channel) else {
            trace!(%symbol, position = channel.position, "Price mid-channel");
            return None;
        };

        let entry = channel.close;
        let targets = self.calculate_targets(&channel, entry, side);
        debug!(
            %symbol,
            %side,
            channel_type = ?channel.channel_type,
            strength = channel.strength,
            position = channel.position,
            risk_reward = targets.risk_reward,
            "Channel setup detected"
        );

        let setup = Setup::new(
            symbol,
            side,
            PriceLevels {
                entry,
                stop_loss: targets.stop_loss,
                take_profit: targets.take_profit,
            },
            channel.timestamp,
            SetupPayload::Channel(channel.to_payload()),
        )
        .with_score(channel.strength * 100.0)
        .with_confidence(channel.strength);

        Some(setup)
    }

    /// Indices of local highs and lows as `(index, price)` points.
    fn local_extrema(&self, cols: &BarColumns) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
        let w = self.config.extrema_window;
        let tol = self.config.extrema_tolerance;
        let n = cols.high.len();
        let mut highs = Vec::new();
        let mut lows = Vec::new();

        for i in w..n.saturating_sub(w) {
            let range = i - w..=i + w;
            let max = cols.high[range.clone()].iter().copied().fold(f64::MIN, f64::max);
            let min = cols.low[range].iter().copied().fold(f64::MAX, f64::min);

            if cols.high[i] >= max * (1.0 - tol) {
                highs.push((i as f64, cols.high[i]));
            }
            if cols.low[i] <= min * (1.0 + tol) {
                lows.push((i as f64, cols.low[i]));
            }
        }

        (highs, lows)
    }

    // A flat line has near-zero r, so a tight residual also qualifies.
    fn line_accepted(&self, fit: &LineFit) -> bool {
        fit.r.abs() >= self.config.min_correlation || fit.residual_dev <= self.config.touch_tolerance
    }

    fn is_parallel(&self, upper_slope: f64, lower_slope: f64) -> bool {
        let flat = self.config.flat_slope;
        if upper_slope.abs() < flat && lower_slope.abs() < flat {
            return true;
        }
        if upper_slope == 0.0 || lower_slope == 0.0 || upper_slope.signum() != lower_slope.signum() {
            return false;
        }

        let ratio = upper_slope / lower_slope;
        let tol = self.config.parallel_tolerance;
        ratio >= 1.0 - tol && ratio <= 1.0 + tol
    }

    /// 1 - coefficient of variation of sampled widths, floored at 0.
    fn width_consistency(&self, upper: &LineFit, lower: &LineFit, n: usize) -> f64 {
        let step = self.config.width_sample_step.max(1);
        let widths: Vec<f64> = (0..n)
            .step_by(step)
            .map(|i| upper.value_at(i as f64) - lower.value_at(i as f64))
            .collect();

        let mean = indicators::mean(&widths);
        if mean <= 0.0 {
            return 0.0;
        }
        (1.0 - indicators::std_dev(&widths) / mean).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use std::f64::consts::PI;

    // ==================== Test Helpers ====================

    fn oscillating_bars(count: usize, base: f64, amplitude: f64, slope: f64) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let mid = base + slope * i as f64 + amplitude * (2.0 * PI * i as f64 / 20.0).sin();
                Bar::new(start + Duration::hours(i as i64), mid, mid, mid, mid, 1000.0)
            })
            .collect()
    }

    fn detector() -> ChannelDetector {
        ChannelDetector::new(ChannelConfig {
            lookback_bars: 120,
            ..ChannelConfig::default()
        })
    }

    // ==================== Detection ====================

    #[test]
    fn test_horizontal_range_over_120_bars() {
        // 98-102 oscillation, exactly one lookback window
        let bars = oscillating_bars(120, 100.0, 2.0, 0.0);
        let channel = detector().detect_channel("BTCUSDT", &bars).unwrap();

        assert_eq!(channel.channel_type, ChannelType::Horizontal);
        assert!(channel.touches_upper >= 2);
        assert!(channel.touches_lower >= 2);
        assert_relative_eq!(channel.width, 0.04, epsilon = 0.005);
        assert!(channel.strength > 0.9);
        assert!((0.0..=1.0).contains(&channel.position));
    }

    #[test]
    fn test_horizontal_oscillation_near_lower_line() {
        // Same range, extended so the last bar sits near the lower line
        let bars = oscillating_bars(138, 100.0, 2.0, 0.0);
        let channel = detector().detect_channel("BTCUSDT", &bars).unwrap();

        assert_eq!(channel.channel_type, ChannelType::Horizontal);
        assert!(channel.touches_upper >= 2);
        assert!(channel.touches_lower >= 2);
        assert_relative_eq!(channel.width, 0.04, epsilon = 0.005);
        assert!(channel.strength > 0.9);
        assert!((0.0..=1.0).contains(&channel.position));
        assert!(channel.position < 0.3);
    }

    #[test]
    fn test_ascending_channel_detected() {
        let bars = oscillating_bars(120, 100.0, 2.0, 0.05);
        let channel = detector().detect_channel("ETHUSDT", &bars).unwrap();

        assert_eq!(channel.channel_type, ChannelType::Ascending);
        assert!(channel.slope > 0.0);
        assert!((0.0..=1.0).contains(&channel.position));
    }

    #[test]
    fn test_too_few_bars_rejected() {
        let bars = oscillating_bars(80, 100.0, 2.0, 0.0);
        assert!(detector().detect_channel("BTCUSDT", &bars).is_none());
    }

    #[test]
    fn test_narrow_channel_rejected() {
        // 0.5 amplitude is ~1% wide, below the 2% floor
        let bars = oscillating_bars(120, 100.0, 0.5, 0.0);
        assert!(detector().detect_channel("BTCUSDT", &bars).is_none());
    }

    #[test]
    fn test_wide_channel_rejected() {
        let bars = oscillating_bars(120, 100.0, 10.0, 0.0);
        assert!(detector().detect_channel("BTCUSDT", &bars).is_none());
    }

    #[test]
    fn test_too_few_touches_rejected() {
        let detector = ChannelDetector::new(ChannelConfig {
            lookback_bars: 120,
            min_touches: 40,
            ..ChannelConfig::default()
        });
        let bars = oscillating_bars(120, 100.0, 2.0, 0.0);
        assert!(detector.detect_channel("BTCUSDT", &bars).is_none());
    }

    // ==================== Signals & Targets ====================

    #[test]
    fn test_trading_zones() {
        let detector = detector();
        let bars = oscillating_bars(138, 100.0, 2.0, 0.0);
        let mut channel = detector.detect_channel("BTCUSDT", &bars).unwrap();

        assert_eq!(detector.trading_signal(&channel), Some(TradeSide::Buy));
        channel.position = 0.5;
        assert_eq!(detector.trading_signal(&channel), None);
        channel.position = 0.85;
        assert_eq!(detector.trading_signal(&channel), Some(TradeSide::Sell));
    }

    #[test]
    fn test_targets_use_opposite_boundary() {
        let detector = detector();
        let bars = oscillating_bars(138, 100.0, 2.0, 0.0);
        let channel = detector.detect_channel("BTCUSDT", &bars).unwrap();

        let buy = detector.calculate_targets(&channel, 98.5, TradeSide::Buy);
        assert_relative_eq!(buy.take_profit, channel.upper);
        assert_relative_eq!(buy.stop_loss, channel.lower * 0.99);
        assert!(buy.risk_reward > 1.0);

        let sell = detector.calculate_targets(&channel, 101.5, TradeSide::Sell);
        assert_relative_eq!(sell.take_profit, channel.lower);
        assert_relative_eq!(sell.stop_loss, channel.upper * 1.01);
    }

    #[test]
    fn test_detect_setup_carries_channel_payload() {
        let bars = oscillating_bars(138, 100.0, 2.0, 0.0);
        let setup = detector().detect_setup("BTCUSDT", &bars).unwrap();

        assert_eq!(setup.side(), TradeSide::Buy);
        assert!(setup.stop_loss() < setup.entry_price());
        assert!(setup.take_profit() > setup.entry_price());
        match setup.payload() {
            SetupPayload::Channel(payload) => {
                assert_relative_eq!(setup.score(), payload.strength * 100.0);
                assert_relative_eq!(setup.confidence(), payload.strength);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
