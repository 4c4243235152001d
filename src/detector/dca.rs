//! Drawdown setups for dollar-cost averaging, gated by market regime.

use super::indicators;
use crate::config::DcaConfig;
use crate::market::{Bar, BarColumns, MarketRegime};
use crate::strategy::{DcaSetup, PriceLevels, Setup, SetupPayload, SupportLevel, TradeSide};
use tracing::{debug, trace};

pub struct DcaDetector {
    config: DcaConfig,
}

impl DcaDetector {
    pub fn new(config: DcaConfig) -> Self {
        Self { config }
    }

    pub fn min_bars(&self) -> usize {
        let cfg = &self.config;
        let support = cfg.support_windows.iter().copied().max().unwrap_or(1);
        let volume = if cfg.volume_filter {
            cfg.long_volume_bars.max(cfg.recent_volume_bars)
        } else {
            0
        };
        cfg.drop_lookback.max(support).max(volume).max(1)
    }

    pub fn detect_setup(&self, symbol: &str, bars: &[Bar], regime: MarketRegime) -> Option<Setup> {
        let cfg = &self.config;
        if !cfg.allowed_regimes.contains(&regime) {
            trace!(%symbol, %regime, "DCA disabled in current regime");
            return None;
        }
        if bars.len() < self.min_bars() {
            trace!(%symbol, bars = bars.len(), "Not enough bars for DCA detection");
            return None;
        }

        let cols = BarColumns::from_bars(bars);
        let close = cols.close[cols.close.len() - 1];
        let rolling_high = indicators::trailing_max(&cols.high, cfg.drop_lookback)?;
        if rolling_high <= 0.0 {
            return None;
        }

        let drop_pct = (close - rolling_high) / rolling_high;
        if drop_pct > -cfg.drop_threshold {
            trace!(%symbol, drop_pct, "Drawdown too shallow");
            return None;
        }

        let volume_ratio = if cfg.volume_filter {
            let n = cols.volume.len();
            let recent = indicators::mean(&cols.volume[n - cfg.recent_volume_bars..]);
            let long = indicators::mean(&cols.volume[n - cfg.long_volume_bars..]);
            let ratio = if long > 0.0 { recent / long } else { 0.0 };
            if ratio < cfg.min_volume_ratio {
                debug!(%symbol, volume_ratio = ratio, "DCA drop on drying volume");
                return None;
            }
            Some(ratio)
        } else {
            None
        };

        let support_levels: Vec<SupportLevel> = cfg
            .support_windows
            .iter()
            .filter_map(|&window| {
                indicators::trailing_min(&cols.low, window).map(|price| SupportLevel {
                    window_bars: window,
                    price,
                })
            })
            .collect();

        let depth = ((-drop_pct - cfg.drop_threshold) / cfg.drop_threshold).clamp(0.0, 1.0);
        let score = 60.0 + 40.0 * depth;
        let (confidence, size_multiplier) = match regime {
            MarketRegime::Bull => (0.60, 1.0),
            MarketRegime::Neutral => (0.55, 0.75),
            _ => (0.50, 0.5),
        };

        debug!(%symbol, %regime, drop_pct, score, "DCA setup detected");

        let setup = Setup::new(
            symbol,
            TradeSide::Buy,
            PriceLevels {
                entry: close,
                stop_loss: close * (1.0 - cfg.stop_loss_pct),
                take_profit: close * (1.0 + cfg.take_profit_pct),
            },
            bars[bars.len() - 1].timestamp,
            SetupPayload::Dca(DcaSetup {
                drop_pct,
                rolling_high,
                volume_ratio,
                support_levels,
                regime,
            }),
        )
        .with_score(score)
        .with_confidence(confidence)
        .with_size_multiplier(size_multiplier);

        Some(setup)
    }
}
