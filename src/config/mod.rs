//! Configuration management for the opportunity scheduler.
//!
//! Loads settings from an optional config file and environment variables.
//! The resulting `Config` is handed to constructors once; nothing re-reads it
//! mid-run.

use crate::market::MarketRegime;
use crate::strategy::StrategyKind;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Capital budget and per-strategy pools
    #[serde(default)]
    pub capital: CapitalConfig,
    /// Scan cycle, scoring and admission settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Market regime classification and multipliers
    #[serde(default)]
    pub regime: RegimeConfig,
    /// Channel detector thresholds
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Swing detector thresholds
    #[serde(default)]
    pub swing: SwingConfig,
    /// DCA detector thresholds
    #[serde(default)]
    pub dca: DcaConfig,
    /// Scan decision storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// One value per strategy kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerStrategy<T> {
    pub channel: T,
    pub swing: T,
    pub dca: T,
}

impl<T> PerStrategy<T> {
    pub fn get(&self, kind: StrategyKind) -> &T {
        match kind {
            StrategyKind::Channel => &self.channel,
            StrategyKind::Swing => &self.swing,
            StrategyKind::Dca => &self.dca,
        }
    }
}

/// Capital slice owned by one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAllocation {
    /// Fraction of total capital reserved for the strategy's pool (0.0-1.0)
    pub allocation_fraction: Decimal,
    /// Fraction of the pool committed to a single position (0.0-1.0)
    pub position_fraction: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalConfig {
    /// Total capital under management in quote currency
    #[serde(default = "default_total_capital")]
    pub total_capital: Decimal,
    /// Capital never allocated to any pool (0.0-1.0)
    #[serde(default = "default_reserve_fraction")]
    pub reserve_fraction: Decimal,
    /// Per-strategy pool sizing
    #[serde(default = "default_allocations")]
    pub allocations: PerStrategy<StrategyAllocation>,
}

/// How signals from different strategies on the same symbol are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep the highest-confidence signal
    HighestConfidence,
    /// Drop every signal on the contested symbol
    SkipBoth,
    /// Keep the highest-priority signal, pause the rest
    PauseLowerPriority,
}

/// Which scorer implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    Heuristic,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Same-symbol conflict policy
    #[serde(default = "default_conflict_policy")]
    pub conflict_policy: ConflictPolicy,
    /// Minimum scorer confidence for a setup to become a signal (0.0-1.0)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Minimum reward/risk ratio for a setup to become a signal
    #[serde(default = "default_min_risk_reward")]
    pub min_risk_reward: f64,
    /// Expected value that maps to a full 1.0 in the priority blend
    #[serde(default = "default_ev_normalization")]
    pub ev_normalization: f64,
    /// Seconds between scan cycles (advisory cadence)
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Bars requested per symbol per cycle
    #[serde(default = "default_lookback_bars")]
    pub lookback_bars: usize,
    /// Asset used for regime classification
    #[serde(default = "default_reference_symbol")]
    pub reference_symbol: String,
    /// Symbol universe override (empty = everything the data provider serves)
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Signal time-to-live in minutes
    #[serde(default = "default_signal_ttl")]
    pub signal_ttl_minutes: PerStrategy<i64>,
    /// Time-based exit horizon in hours
    #[serde(default = "default_max_hold")]
    pub max_hold_hours: PerStrategy<i64>,
    /// Confidence scorer implementation
    #[serde(default = "default_scorer")]
    pub scorer: ScorerKind,
    /// JSON weights file for the model scorer
    #[serde(default)]
    pub model_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Capital multiplier applied in CAUTION regime
    #[serde(default = "default_caution_multiplier")]
    pub caution_multiplier: Decimal,
    /// Capital multiplier applied in EUPHORIA regime
    #[serde(default = "default_euphoria_multiplier")]
    pub euphoria_multiplier: Decimal,
    /// Short moving average period (bars)
    #[serde(default = "default_regime_short_ma")]
    pub short_ma: usize,
    /// Long moving average period (bars)
    #[serde(default = "default_regime_long_ma")]
    pub long_ma: usize,
    /// Bars spanning 24h for change/volatility measurement
    #[serde(default = "default_bars_per_day")]
    pub change_window_bars: usize,
    /// 24h drop that classifies as PANIC (0.0-1.0)
    #[serde(default = "default_panic_drop")]
    pub panic_drop: f64,
    /// 24h drop that classifies as CRASH (0.0-1.0)
    #[serde(default = "default_crash_drop")]
    pub crash_drop: f64,
    /// 24h gain that classifies as EUPHORIA (0.0-1.0)
    #[serde(default = "default_euphoria_gain")]
    pub euphoria_gain: f64,
    /// Per-bar return std-dev that classifies as CAUTION
    #[serde(default = "default_caution_volatility")]
    pub caution_volatility: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Bars fitted per detection
    #[serde(default = "default_channel_lookback")]
    pub lookback_bars: usize,
    /// Neighbours compared on each side when locating extrema
    #[serde(default = "default_extrema_window")]
    pub extrema_window: usize,
    /// Relative distance from the window extreme still counted as extreme
    #[serde(default = "default_extrema_tolerance")]
    pub extrema_tolerance: f64,
    /// Minimum touches (and extrema) required on each boundary
    #[serde(default = "default_min_touches")]
    pub min_touches: usize,
    /// Minimum |r| for a sloped boundary fit
    #[serde(default = "default_min_correlation")]
    pub min_correlation: f64,
    /// Allowed slope ratio deviation from 1.0 for parallel lines
    #[serde(default = "default_parallel_tolerance")]
    pub parallel_tolerance: f64,
    /// Normalised slope per bar below which a line counts as flat
    #[serde(default = "default_flat_slope")]
    pub flat_slope: f64,
    /// Relative distance from a line that counts as a touch
    #[serde(default = "default_touch_tolerance")]
    pub touch_tolerance: f64,
    /// Minimum channel width as a fraction of average price
    #[serde(default = "default_channel_min_width")]
    pub min_width: f64,
    /// Maximum channel width as a fraction of average price
    #[serde(default = "default_channel_max_width")]
    pub max_width: f64,
    /// Strength that a valid channel must exceed (0.0-1.0)
    #[serde(default = "default_min_strength")]
    pub min_strength: f64,
    /// Position at or below which the channel signals BUY
    #[serde(default = "default_buy_zone")]
    pub buy_zone: f64,
    /// Position at or above which the channel signals SELL
    #[serde(default = "default_sell_zone")]
    pub sell_zone: f64,
    /// Stop distance beyond the near boundary (fraction)
    #[serde(default = "default_stop_buffer")]
    pub stop_buffer: f64,
    /// Bar spacing of width samples for the consistency score
    #[serde(default = "default_width_sample_step")]
    pub width_sample_step: usize,
    /// Close beyond a boundary by this fraction invalidates an open position
    #[serde(default = "default_invalidation_buffer")]
    pub invalidation_buffer: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingConfig {
    #[serde(default = "default_fast_ma")]
    pub fast_ma: usize,
    #[serde(default = "default_slow_ma")]
    pub slow_ma: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_bb_period")]
    pub bb_period: usize,
    #[serde(default = "default_bb_std")]
    pub bb_std: f64,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_volume_ma")]
    pub volume_ma: usize,
    /// Prior bars scanned for rolling resistance/support
    #[serde(default = "default_resistance_lookback")]
    pub resistance_lookback: usize,
    /// Bars spanned by the raw momentum measurement
    #[serde(default = "default_momentum_lookback")]
    pub momentum_lookback: usize,
    /// Close must exceed resistance times this factor
    #[serde(default = "default_breakout_threshold")]
    pub breakout_threshold: f64,
    /// Volume ratio that confirms a breakout
    #[serde(default = "default_volume_spike")]
    pub volume_spike: f64,
    #[serde(default = "default_rsi_bullish_floor")]
    pub rsi_bullish_floor: f64,
    #[serde(default = "default_bb_rsi_min")]
    pub bb_rsi_min: f64,
    #[serde(default = "default_bb_rsi_max")]
    pub bb_rsi_max: f64,
    /// RSI above this rejects the setup outright
    #[serde(default = "default_rsi_extreme")]
    pub rsi_extreme: f64,
    /// Momentum (fractional change) that earns momentum points
    #[serde(default = "default_momentum_threshold")]
    pub momentum_threshold: f64,
    #[serde(default = "default_atr_stop_multiplier")]
    pub atr_stop_multiplier: f64,
    #[serde(default = "default_atr_target_multiplier")]
    pub atr_target_multiplier: f64,
    /// Minimum stop distance below entry (fraction)
    #[serde(default = "default_min_stop_pct")]
    pub min_stop_pct: f64,
    /// Minimum target distance above entry (fraction)
    #[serde(default = "default_min_target_pct")]
    pub min_target_pct: f64,
    /// ATR / close above this rejects the setup
    #[serde(default = "default_max_volatility")]
    pub max_volatility: f64,
    /// Minimum 24h dollar volume
    #[serde(default = "default_min_dollar_volume")]
    pub min_dollar_volume: f64,
    /// Bars spanning 24h for the dollar volume gate
    #[serde(default = "default_bars_per_day")]
    pub dollar_volume_bars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaConfig {
    /// Bars scanned for the rolling high
    #[serde(default = "default_drop_lookback")]
    pub drop_lookback: usize,
    /// Drop from the rolling high that qualifies (0.0-1.0)
    #[serde(default = "default_drop_threshold")]
    pub drop_threshold: f64,
    /// Require recent volume not materially below the longer average
    #[serde(default = "default_volume_filter")]
    pub volume_filter: bool,
    #[serde(default = "default_recent_volume_bars")]
    pub recent_volume_bars: usize,
    #[serde(default = "default_long_volume_bars")]
    pub long_volume_bars: usize,
    /// Recent / long volume ratio floor
    #[serde(default = "default_min_volume_ratio")]
    pub min_volume_ratio: f64,
    /// Rolling-min windows (bars) used as grid support levels
    #[serde(default = "default_support_windows")]
    pub support_windows: Vec<usize>,
    #[serde(default = "default_dca_stop_loss")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_dca_take_profit")]
    pub take_profit_pct: f64,
    /// Regimes in which DCA setups may be emitted
    #[serde(default = "default_allowed_regimes")]
    pub allowed_regimes: Vec<MarketRegime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Record scan decisions and closed trades
    #[serde(default = "default_persistence_enabled")]
    pub enabled: bool,
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

// Default value functions
fn default_total_capital() -> Decimal {
    Decimal::new(10_000, 0) // 10,000 USDT
}

fn default_reserve_fraction() -> Decimal {
    Decimal::new(10, 2) // 0.10 never deployed
}

fn default_allocations() -> PerStrategy<StrategyAllocation> {
    PerStrategy {
        channel: StrategyAllocation {
            allocation_fraction: Decimal::new(30, 2), // 0.30
            position_fraction: Decimal::new(25, 2),   // 4 concurrent positions
        },
        swing: StrategyAllocation {
            allocation_fraction: Decimal::new(35, 2), // 0.35
            position_fraction: Decimal::new(25, 2),
        },
        dca: StrategyAllocation {
            allocation_fraction: Decimal::new(25, 2), // 0.25
            position_fraction: Decimal::new(20, 2),   // 5 grid entries
        },
    }
}

fn default_conflict_policy() -> ConflictPolicy {
    ConflictPolicy::HighestConfidence
}

fn default_min_confidence() -> f64 {
    0.55
}

fn default_min_risk_reward() -> f64 {
    1.2
}

fn default_ev_normalization() -> f64 {
    0.05 // +5% expected value saturates the EV term
}

fn default_scan_interval() -> u64 {
    300
}

fn default_lookback_bars() -> usize {
    200
}

fn default_reference_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_signal_ttl() -> PerStrategy<i64> {
    PerStrategy {
        channel: 15,
        swing: 30,
        dca: 60,
    }
}

fn default_max_hold() -> PerStrategy<i64> {
    PerStrategy {
        channel: 48,
        swing: 72,
        dca: 168,
    }
}

fn default_scorer() -> ScorerKind {
    ScorerKind::Heuristic
}

fn default_caution_multiplier() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_euphoria_multiplier() -> Decimal {
    Decimal::new(7, 1) // 0.7
}

fn default_regime_short_ma() -> usize {
    20
}

fn default_regime_long_ma() -> usize {
    50
}

fn default_bars_per_day() -> usize {
    24 // hourly bars
}

fn default_panic_drop() -> f64 {
    0.20
}

fn default_crash_drop() -> f64 {
    0.10
}

fn default_euphoria_gain() -> f64 {
    0.15
}

fn default_caution_volatility() -> f64 {
    0.03
}

fn default_channel_lookback() -> usize {
    100
}

fn default_extrema_window() -> usize {
    3
}

fn default_extrema_tolerance() -> f64 {
    0.001 // 0.1%
}

fn default_min_touches() -> usize {
    2
}

fn default_min_correlation() -> f64 {
    0.5
}

fn default_parallel_tolerance() -> f64 {
    0.3
}

fn default_flat_slope() -> f64 {
    0.0002 // 0.02% of price per bar
}

fn default_touch_tolerance() -> f64 {
    0.005
}

fn default_channel_min_width() -> f64 {
    0.02
}

fn default_channel_max_width() -> f64 {
    0.15
}

fn default_min_strength() -> f64 {
    0.5
}

fn default_buy_zone() -> f64 {
    0.30
}

fn default_sell_zone() -> f64 {
    0.70
}

fn default_stop_buffer() -> f64 {
    0.01
}

fn default_width_sample_step() -> usize {
    10
}

fn default_invalidation_buffer() -> f64 {
    0.005 // inside the 1% stop buffer
}

fn default_fast_ma() -> usize {
    20
}

fn default_slow_ma() -> usize {
    50
}

fn default_rsi_period() -> usize {
    14
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_bb_period() -> usize {
    20
}

fn default_bb_std() -> f64 {
    2.0
}

fn default_atr_period() -> usize {
    14
}

fn default_volume_ma() -> usize {
    20
}

fn default_resistance_lookback() -> usize {
    20
}

fn default_momentum_lookback() -> usize {
    10
}

fn default_breakout_threshold() -> f64 {
    1.01
}

fn default_volume_spike() -> f64 {
    1.5
}

fn default_rsi_bullish_floor() -> f64 {
    50.0
}

fn default_bb_rsi_min() -> f64 {
    50.0
}

fn default_bb_rsi_max() -> f64 {
    70.0
}

fn default_rsi_extreme() -> f64 {
    85.0
}

fn default_momentum_threshold() -> f64 {
    0.02
}

fn default_atr_stop_multiplier() -> f64 {
    2.0
}

fn default_atr_target_multiplier() -> f64 {
    3.0
}

fn default_min_stop_pct() -> f64 {
    0.02
}

fn default_min_target_pct() -> f64 {
    0.03
}

fn default_max_volatility() -> f64 {
    0.08
}

fn default_min_dollar_volume() -> f64 {
    1_000_000.0
}

fn default_drop_lookback() -> usize {
    24
}

fn default_drop_threshold() -> f64 {
    0.05
}

fn default_volume_filter() -> bool {
    true
}

fn default_recent_volume_bars() -> usize {
    6
}

fn default_long_volume_bars() -> usize {
    48
}

fn default_min_volume_ratio() -> f64 {
    0.7
}

fn default_support_windows() -> Vec<usize> {
    vec![1, 4, 24] // 1h / 4h / 24h on hourly bars
}

fn default_dca_stop_loss() -> f64 {
    0.05
}

fn default_dca_take_profit() -> f64 {
    0.08
}

fn default_allowed_regimes() -> Vec<MarketRegime> {
    vec![MarketRegime::Bull, MarketRegime::Neutral]
}

fn default_persistence_enabled() -> bool {
    true
}

fn default_db_path() -> String {
    "data/scans.db".to_string()
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("OPS"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let capital = &self.capital;
        anyhow::ensure!(
            capital.total_capital > Decimal::ZERO,
            "total_capital must be positive"
        );
        anyhow::ensure!(
            capital.reserve_fraction >= Decimal::ZERO && capital.reserve_fraction < Decimal::ONE,
            "reserve_fraction must be in [0, 1)"
        );

        let mut allocated = capital.reserve_fraction;
        for kind in StrategyKind::ALL {
            let alloc = capital.allocations.get(kind);
            anyhow::ensure!(
                alloc.allocation_fraction > Decimal::ZERO
                    && alloc.allocation_fraction <= Decimal::ONE,
                "{} allocation_fraction must be between 0 and 1",
                kind
            );
            anyhow::ensure!(
                alloc.position_fraction > Decimal::ZERO && alloc.position_fraction <= Decimal::ONE,
                "{} position_fraction must be between 0 and 1",
                kind
            );
            allocated += alloc.allocation_fraction;
        }
        anyhow::ensure!(
            allocated <= Decimal::ONE,
            "allocation fractions plus reserve must not exceed 1 (got {})",
            allocated
        );

        let scheduler = &self.scheduler;
        anyhow::ensure!(
            scheduler.min_confidence > 0.0 && scheduler.min_confidence < 1.0,
            "min_confidence must be between 0 and 1"
        );
        anyhow::ensure!(
            scheduler.min_risk_reward >= 0.0,
            "min_risk_reward must not be negative"
        );
        anyhow::ensure!(
            scheduler.ev_normalization > 0.0,
            "ev_normalization must be positive"
        );
        anyhow::ensure!(scheduler.lookback_bars > 0, "lookback_bars must be positive");
        for kind in StrategyKind::ALL {
            anyhow::ensure!(
                *scheduler.signal_ttl_minutes.get(kind) > 0,
                "{} signal TTL must be positive",
                kind
            );
        }

        let regime = &self.regime;
        for multiplier in [regime.caution_multiplier, regime.euphoria_multiplier] {
            anyhow::ensure!(
                multiplier > Decimal::ZERO && multiplier <= Decimal::ONE,
                "regime multipliers must be between 0 and 1"
            );
        }
        anyhow::ensure!(
            regime.short_ma < regime.long_ma,
            "regime short_ma must be shorter than long_ma"
        );
        anyhow::ensure!(
            regime.crash_drop < regime.panic_drop,
            "crash_drop must be smaller than panic_drop"
        );

        let channel = &self.channel;
        anyhow::ensure!(
            channel.min_width < channel.max_width,
            "channel min_width must be below max_width"
        );
        anyhow::ensure!(
            channel.buy_zone < channel.sell_zone,
            "channel buy_zone must be below sell_zone"
        );
        anyhow::ensure!(channel.min_touches >= 1, "channel min_touches must be >= 1");
        anyhow::ensure!(
            channel.extrema_window >= 1,
            "channel extrema_window must be >= 1"
        );

        let swing = &self.swing;
        anyhow::ensure!(
            swing.fast_ma < swing.slow_ma,
            "swing fast_ma must be shorter than slow_ma"
        );
        anyhow::ensure!(
            swing.macd_fast < swing.macd_slow,
            "swing macd_fast must be shorter than macd_slow"
        );

        let dca = &self.dca;
        anyhow::ensure!(
            dca.drop_threshold > 0.0 && dca.drop_threshold < 1.0,
            "dca drop_threshold must be between 0 and 1"
        );
        anyhow::ensure!(
            !dca.support_windows.is_empty() && dca.support_windows.iter().all(|w| *w > 0),
            "dca support_windows must be non-empty and positive"
        );

        Ok(())
    }

    /// Capital ceiling of one strategy's pool.
    pub fn pool_capital(&self, kind: StrategyKind) -> Decimal {
        self.capital.total_capital * self.capital.allocations.get(kind).allocation_fraction
    }
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            total_capital: default_total_capital(),
            reserve_fraction: default_reserve_fraction(),
            allocations: default_allocations(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            conflict_policy: default_conflict_policy(),
            min_confidence: default_min_confidence(),
            min_risk_reward: default_min_risk_reward(),
            ev_normalization: default_ev_normalization(),
            scan_interval_secs: default_scan_interval(),
            lookback_bars: default_lookback_bars(),
            reference_symbol: default_reference_symbol(),
            symbols: Vec::new(),
            signal_ttl_minutes: default_signal_ttl(),
            max_hold_hours: default_max_hold(),
            scorer: default_scorer(),
            model_path: None,
        }
    }
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            caution_multiplier: default_caution_multiplier(),
            euphoria_multiplier: default_euphoria_multiplier(),
            short_ma: default_regime_short_ma(),
            long_ma: default_regime_long_ma(),
            change_window_bars: default_bars_per_day(),
            panic_drop: default_panic_drop(),
            crash_drop: default_crash_drop(),
            euphoria_gain: default_euphoria_gain(),
            caution_volatility: default_caution_volatility(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            lookback_bars: default_channel_lookback(),
            extrema_window: default_extrema_window(),
            extrema_tolerance: default_extrema_tolerance(),
            min_touches: default_min_touches(),
            min_correlation: default_min_correlation(),
            parallel_tolerance: default_parallel_tolerance(),
            flat_slope: default_flat_slope(),
            touch_tolerance: default_touch_tolerance(),
            min_width: default_channel_min_width(),
            max_width: default_channel_max_width(),
            min_strength: default_min_strength(),
            buy_zone: default_buy_zone(),
            sell_zone: default_sell_zone(),
            stop_buffer: default_stop_buffer(),
            width_sample_step: default_width_sample_step(),
            invalidation_buffer: default_invalidation_buffer(),
        }
    }
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            fast_ma: default_fast_ma(),
            slow_ma: default_slow_ma(),
            rsi_period: default_rsi_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bb_period: default_bb_period(),
            bb_std: default_bb_std(),
            atr_period: default_atr_period(),
            volume_ma: default_volume_ma(),
            resistance_lookback: default_resistance_lookback(),
            momentum_lookback: default_momentum_lookback(),
            breakout_threshold: default_breakout_threshold(),
            volume_spike: default_volume_spike(),
            rsi_bullish_floor: default_rsi_bullish_floor(),
            bb_rsi_min: default_bb_rsi_min(),
            bb_rsi_max: default_bb_rsi_max(),
            rsi_extreme: default_rsi_extreme(),
            momentum_threshold: default_momentum_threshold(),
            atr_stop_multiplier: default_atr_stop_multiplier(),
            atr_target_multiplier: default_atr_target_multiplier(),
            min_stop_pct: default_min_stop_pct(),
            min_target_pct: default_min_target_pct(),
            max_volatility: default_max_volatility(),
            min_dollar_volume: default_min_dollar_volume(),
            dollar_volume_bars: default_bars_per_day(),
        }
    }
}

impl Default for DcaConfig {
    fn default() -> Self {
        Self {
            drop_lookback: default_drop_lookback(),
            drop_threshold: default_drop_threshold(),
            volume_filter: default_volume_filter(),
            recent_volume_bars: default_recent_volume_bars(),
            long_volume_bars: default_long_volume_bars(),
            min_volume_ratio: default_min_volume_ratio(),
            support_windows: default_support_windows(),
            stop_loss_pct: default_dca_stop_loss(),
            take_profit_pct: default_dca_take_profit(),
            allowed_regimes: default_allowed_regimes(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_persistence_enabled(),
            db_path: default_db_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_over_allocation_rejected() {
        let mut config = Config::default();
        config.capital.allocations.swing.allocation_fraction = dec!(0.50);

        // 0.10 reserve + 0.30 + 0.50 + 0.25 > 1
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must not exceed 1"));
    }

    #[test]
    fn test_inverted_zones_rejected() {
        let mut config = Config::default();
        config.channel.buy_zone = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_capital() {
        let config = Config::default();
        assert_eq!(config.pool_capital(StrategyKind::Channel), dec!(3000));
        assert_eq!(config.pool_capital(StrategyKind::Dca), dec!(2500));
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: ConflictPolicy = serde_json::from_str("\"pause_lower_priority\"").unwrap();
        assert_eq!(policy, ConflictPolicy::PauseLowerPriority);
    }
}
