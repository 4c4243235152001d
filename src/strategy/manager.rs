//! Strategy orchestrator.
//!
//! Turns detector output into admitted, capital-bounded, conflict-free
//! positions:
//!
//! market data -> detectors -> scorer -> signals -> expiry / active filter ->
//! conflict resolution -> capital admission -> execution -> (on close)
//! capital release and performance feedback.
//!
//! Every method takes `&self`; shared state lives behind the ledger, the
//! position book and the performance tracker, none of which is locked across
//! an `.await`.

use super::conflict::{self, ConflictResolution};
use super::ledger::CapitalLedger;
use super::performance::{PerformanceTracker, PRIOR_WIN_RATE};
use super::positions::{ActivePosition, PositionBook};
use super::setup::{Setup, StrategyKind};
use super::signal::{rank_signals, Signal, SignalState};
use crate::config::Config;
use crate::detector::{ChannelDetector, DcaDetector, SwingDetector};
use crate::exchange::{CloseRequest, ExecutionClient, ExecutionRequest};
use crate::market::{Bar, MarketDataProvider, MarketRegime, MarketSnapshot, RegimeDetector};
use crate::persistence::{ClosedTradeRecord, ScanDecision, ScanDecisionRecord, ScanRecorder};
use crate::risk::{ExitMonitor, ExitReason};
use crate::scoring::{build_scorer, Scorer};
use crate::utils::decimal::{round_to_precision, to_decimal};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Priority blend weights.
const CONFIDENCE_WEIGHT: f64 = 0.4;
const WIN_RATE_WEIGHT: f64 = 0.3;
const EV_WEIGHT: f64 = 0.3;

/// Result of one scan over a market snapshot.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub regime: MarketRegime,
    /// Ranked, pending signals
    pub signals: Vec<Signal>,
    /// One record per symbol x strategy
    pub decisions: Vec<ScanDecisionRecord>,
    pub detected: usize,
    pub near_misses: usize,
}

/// Result of capital admission.
#[derive(Debug, Default)]
pub struct Admission {
    /// Descending priority
    pub admitted: Vec<Signal>,
    pub rejected: Vec<Signal>,
}

#[derive(Debug, Default)]
pub struct ExecutionSummary {
    pub opened: Vec<ActivePosition>,
    pub expired: Vec<Signal>,
    pub skipped_active: Vec<Signal>,
    pub capital_rejected: Vec<Signal>,
    pub failed: Vec<Signal>,
}

/// Position closed by the exit monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPosition {
    pub symbol: String,
    pub strategy: StrategyKind,
    pub reason: ExitReason,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub released_capital: Decimal,
    pub closed_at: DateTime<Utc>,
}

/// Counters for one full cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleSummary {
    pub regime: MarketRegime,
    pub fetched: usize,
    pub failed_fetches: usize,
    pub closed: usize,
    pub detected: usize,
    pub near_misses: usize,
    pub signals: usize,
    pub expired: usize,
    pub skipped_active: usize,
    pub conflict_dropped: usize,
    pub paused: usize,
    pub capital_rejected: usize,
    pub executed: usize,
    pub failed: usize,
}

/// Multi-strategy scheduler.
pub struct StrategyManager {
    config: Config,
    channel: ChannelDetector,
    swing: SwingDetector,
    dca: DcaDetector,
    regime_detector: RegimeDetector,
    scorer: Box<dyn Scorer>,
    ledger: CapitalLedger,
    positions: PositionBook,
    performance: PerformanceTracker,
    exits: ExitMonitor,
    executor: Arc<dyn ExecutionClient>,
    recorder: Arc<dyn ScanRecorder>,
}

impl StrategyManager {
    pub fn new(
        config: Config,
        scorer: Box<dyn Scorer>,
        executor: Arc<dyn ExecutionClient>,
        recorder: Arc<dyn ScanRecorder>,
    ) -> Self {
        Self {
            channel: ChannelDetector::new(config.channel.clone()),
            swing: SwingDetector::new(config.swing.clone()),
            dca: DcaDetector::new(config.dca.clone()),
            regime_detector: RegimeDetector::new(config.regime.clone()),
            ledger: CapitalLedger::new(&config.capital),
            positions: PositionBook::new(),
            performance: PerformanceTracker::new(),
            exits: ExitMonitor::from_config(&config),
            scorer,
            executor,
            recorder,
            config,
        }
    }

    /// Build with the scorer named in the config.
    pub fn from_config(
        config: Config,
        executor: Arc<dyn ExecutionClient>,
        recorder: Arc<dyn ScanRecorder>,
    ) -> Result<Self> {
        let scorer = build_scorer(&config.scheduler)?;
        Ok(Self::new(config, scorer, executor, recorder))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &CapitalLedger {
        &self.ledger
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.performance
    }

    // ==================== Scanning ====================

    /// Run every detector over the snapshot and return ranked signals.
    ///
    /// CPU-bound; detectors fan out over symbols on the rayon pool. Decisions
    /// are handed to the recorder before returning.
    #[instrument(skip(self, snapshot), fields(symbols = snapshot.len()))]
    pub fn scan_for_opportunities(&self, snapshot: &MarketSnapshot) -> ScanOutcome {
        let now = snapshot.taken_at;
        let reference = &self.config.scheduler.reference_symbol;
        let regime = self
            .regime_detector
            .classify_or_neutral(snapshot.bars(reference));

        let symbols = snapshot.symbols();
        let mut outcome = ScanOutcome {
            regime,
            ..Default::default()
        };

        if regime.halts_trading() {
            warn!(%regime, "🚨 Trading halted by market regime, no new signals");
            outcome.decisions = symbols
                .iter()
                .flat_map(|symbol| {
                    StrategyKind::ALL.into_iter().map(move |kind| ScanDecisionRecord {
                        timestamp: now,
                        symbol: symbol.to_string(),
                        strategy: kind,
                        decision: ScanDecision::Skip,
                        confidence: None,
                        expected_value: None,
                        reason: Some(format!("regime {}", regime)),
                        features: serde_json::Value::Null,
                    })
                })
                .collect();
            self.persist_decisions(&outcome.decisions);
            return outcome;
        }

        let win_rates = self.performance.win_rates();
        let evaluations: Vec<Evaluation> = symbols
            .par_iter()
            .flat_map_iter(|symbol| {
                let bars = snapshot.bars(symbol).unwrap_or_default();
                StrategyKind::ALL
                    .into_iter()
                    .map(|kind| self.evaluate(symbol, bars, kind, regime, &win_rates, now))
                    .collect::<Vec<_>>()
            })
            .collect();

        for evaluation in evaluations {
            match evaluation.decision.decision {
                ScanDecision::Take => outcome.detected += 1,
                ScanDecision::NearMiss => {
                    outcome.detected += 1;
                    outcome.near_misses += 1;
                }
                ScanDecision::Skip => {}
            }
            outcome.decisions.push(evaluation.decision);
            if let Some(signal) = evaluation.signal {
                outcome.signals.push(signal);
            }
        }

        rank_signals(&mut outcome.signals);
        self.persist_decisions(&outcome.decisions);

        info!(
            %regime,
            detected = outcome.detected,
            near_misses = outcome.near_misses,
            signals = outcome.signals.len(),
            "🔍 Scan complete"
        );
        outcome
    }

    fn detect(
        &self,
        symbol: &str,
        bars: &[Bar],
        kind: StrategyKind,
        regime: MarketRegime,
    ) -> Option<Setup> {
        match kind {
            StrategyKind::Channel => self.channel.detect_setup(symbol, bars),
            StrategyKind::Swing => self.swing.detect_setup(symbol, bars),
            StrategyKind::Dca => self.dca.detect_setup(symbol, bars, regime),
        }
    }

    fn evaluate(
        &self,
        symbol: &str,
        bars: &[Bar],
        kind: StrategyKind,
        regime: MarketRegime,
        win_rates: &HashMap<StrategyKind, f64>,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let Some(setup) = self.detect(symbol, bars, kind, regime) else {
            return Evaluation::skip(symbol, kind, now);
        };

        let scheduler = &self.config.scheduler;
        let card = self.scorer.score(&setup);
        let expected_value = card.expected_value(scheduler.min_confidence);
        let mut decision = ScanDecisionRecord {
            timestamp: now,
            symbol: symbol.to_string(),
            strategy: kind,
            decision: ScanDecision::NearMiss,
            confidence: Some(card.confidence),
            expected_value: Some(expected_value),
            reason: None,
            features: setup.feature_snapshot(),
        };

        if card.confidence < scheduler.min_confidence {
            debug!(%symbol, strategy = %kind, confidence = card.confidence, "Near miss: confidence");
            decision.reason = Some(format!(
                "confidence {:.3} below {:.3}",
                card.confidence, scheduler.min_confidence
            ));
            return Evaluation { decision, signal: None };
        }
        if setup.risk_reward() < scheduler.min_risk_reward {
            debug!(%symbol, strategy = %kind, risk_reward = setup.risk_reward(), "Near miss: risk/reward");
            decision.reason = Some(format!(
                "risk/reward {:.2} below {:.2}",
                setup.risk_reward(),
                scheduler.min_risk_reward
            ));
            return Evaluation { decision, signal: None };
        }

        let required_capital = self.required_capital(&setup, regime);
        if required_capital <= Decimal::ZERO {
            decision.reason = Some("zero position size".to_string());
            return Evaluation { decision, signal: None };
        }

        let win_rate = win_rates.get(&kind).copied().unwrap_or(PRIOR_WIN_RATE);
        let priority = priority_score(card.confidence, win_rate, expected_value, scheduler.ev_normalization);
        let ttl = Duration::minutes(*scheduler.signal_ttl_minutes.get(kind));

        decision.decision = ScanDecision::Take;
        let signal = Signal::new(
            setup,
            card.confidence,
            expected_value,
            required_capital,
            priority,
            now,
            ttl,
        );
        debug!(
            %symbol,
            strategy = %kind,
            confidence = card.confidence,
            priority,
            %required_capital,
            "Signal generated"
        );

        Evaluation {
            decision,
            signal: Some(signal),
        }
    }

    /// Pool capital x position fraction x setup size x regime multiplier.
    fn required_capital(&self, setup: &Setup, regime: MarketRegime) -> Decimal {
        let kind = setup.kind();
        let position_fraction = self.config.capital.allocations.get(kind).position_fraction;
        let size = to_decimal(setup.size_multiplier());
        let regime_multiplier = regime.capital_multiplier(&self.config.regime);

        round_to_precision(
            self.config.pool_capital(kind) * position_fraction * size * regime_multiplier,
            2,
        )
    }

    fn persist_decisions(&self, decisions: &[ScanDecisionRecord]) {
        if decisions.is_empty() {
            return;
        }
        if let Err(e) = self.recorder.record(decisions) {
            error!(error = %e, count = decisions.len(), "Failed to record scan decisions");
        }
    }

    // ==================== Conflicts & Admission ====================

    /// Resolve same-symbol signals with the configured policy.
    pub fn resolve_conflicts(&self, signals: Vec<Signal>) -> ConflictResolution {
        conflict::resolve_conflicts(signals, self.config.scheduler.conflict_policy)
    }

    /// Greedy admission by descending priority against each pool's current
    /// availability.
    pub fn apply_capital_constraints(&self, mut signals: Vec<Signal>) -> Admission {
        rank_signals(&mut signals);

        let mut committed: HashMap<StrategyKind, Decimal> = HashMap::new();
        let mut admission = Admission::default();

        for signal in signals {
            let kind = signal.kind();
            let running = committed.entry(kind).or_insert(Decimal::ZERO);
            let available = self.ledger.available(kind) - *running;

            if signal.required_capital <= available {
                *running += signal.required_capital;
                admission.admitted.push(signal);
            } else {
                info!(
                    symbol = %signal.symbol(),
                    strategy = %kind,
                    required = %signal.required_capital,
                    %available,
                    "💸 Capital rejected"
                );
                admission.rejected.push(signal.into_state(SignalState::CapitalRejected));
            }
        }

        admission
    }

    // ==================== Execution ====================

    /// Execute admitted signals in order.
    ///
    /// Per signal: expiry and symbol checks, symbol claim, pool reservation,
    /// then the execution call with no lock held. A failed call returns the
    /// reservation and the claim; the batch continues.
    #[instrument(skip(self, admitted), fields(count = admitted.len()))]
    pub async fn execute_signals(&self, admitted: Vec<Signal>, now: DateTime<Utc>) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();

        for mut signal in admitted {
            let symbol = signal.symbol().to_string();
            let kind = signal.kind();

            if signal.is_expired(now) {
                debug!(%symbol, strategy = %kind, expires_at = %signal.expires_at, "Signal expired before execution");
                summary.expired.push(signal.into_state(SignalState::Expired));
                continue;
            }

            if !self.positions.try_claim(&symbol) {
                debug!(%symbol, strategy = %kind, "Symbol already active, skipping");
                summary
                    .skipped_active
                    .push(signal.into_state(SignalState::ConflictDropped));
                continue;
            }

            let amount = signal.required_capital;
            if !self.ledger.reserve(kind, amount) {
                self.positions.abandon(&symbol);
                info!(%symbol, strategy = %kind, required = %amount, "💸 Capital rejected at execution");
                summary
                    .capital_rejected
                    .push(signal.into_state(SignalState::CapitalRejected));
                continue;
            }

            let request = ExecutionRequest::from_signal(&signal);
            match self.executor.open_position(&request).await {
                Ok(handle) => {
                    signal.transition(SignalState::Executed);
                    signal.transition(SignalState::Active);
                    info!(
                        %symbol,
                        strategy = %kind,
                        side = %request.side,
                        price = %handle.filled_price,
                        notional = %amount,
                        "✅ Position opened"
                    );

                    let position = ActivePosition {
                        signal,
                        reserved_capital: amount,
                        opened_at: handle.opened_at,
                        handle,
                    };
                    self.positions.activate(position.clone());
                    summary.opened.push(position);
                }
                Err(e) => {
                    self.ledger.release(kind, amount);
                    self.positions.abandon(&symbol);
                    error!(%symbol, strategy = %kind, error = %e, "❌ Execution failed");
                    summary.failed.push(signal.into_state(SignalState::Failed));
                }
            }
        }

        summary
    }

    // ==================== Closing ====================

    /// Close bookkeeping for a symbol: release its reservation exactly and
    /// feed the outcome into the strategy's performance.
    pub fn update_performance(&self, symbol: &str, pnl: Decimal, is_win: bool) -> Option<ActivePosition> {
        let Some(mut position) = self.positions.remove(symbol) else {
            warn!(%symbol, "No active position to close");
            return None;
        };

        let kind = position.signal.kind();
        self.ledger.release(kind, position.reserved_capital);
        self.performance.record(kind, pnl, is_win);
        position.signal.transition(SignalState::Closed);

        info!(
            %symbol,
            strategy = %kind,
            %pnl,
            released = %position.reserved_capital,
            win_rate = self.performance.win_rate(kind),
            "📊 Position closed"
        );
        Some(position)
    }

    /// Evaluate every open position against its latest bar and close the ones
    /// whose exit condition fired. A failed close keeps the position.
    pub async fn check_exits(&self, snapshot: &MarketSnapshot, now: DateTime<Utc>) -> Vec<ClosedPosition> {
        let mut closed = Vec::new();

        for position in self.positions.snapshot() {
            let symbol = position.symbol().to_string();
            let Some(bar) = snapshot.latest(&symbol) else {
                continue;
            };
            let Some(exit) = self.exits.evaluate(&position, bar, now) else {
                continue;
            };

            let request = CloseRequest {
                handle: position.handle.clone(),
                exit_price: to_decimal(exit.exit_price),
                reason: exit.reason,
            };
            let report = match self.executor.close_position(&request).await {
                Ok(report) => report,
                Err(e) => {
                    error!(%symbol, reason = %exit.reason, error = %e, "❌ Failed to close position");
                    continue;
                }
            };

            if self
                .update_performance(&symbol, report.realized_pnl, report.is_win())
                .is_none()
            {
                continue;
            }

            let trade = ClosedTradeRecord {
                position_id: report.position_id.clone(),
                symbol: symbol.clone(),
                strategy: position.handle.strategy,
                side: position.handle.side,
                entry_price: position.handle.filled_price,
                exit_price: report.exit_price,
                realized_pnl: report.realized_pnl,
                reason: exit.reason,
                opened_at: position.opened_at,
                closed_at: report.closed_at,
            };
            if let Err(e) = self.recorder.record_closed_trade(&trade) {
                error!(%symbol, error = %e, "Failed to record closed trade");
            }

            closed.push(ClosedPosition {
                symbol,
                strategy: position.handle.strategy,
                reason: exit.reason,
                exit_price: report.exit_price,
                realized_pnl: report.realized_pnl,
                released_capital: position.reserved_capital,
                closed_at: report.closed_at,
            });
        }

        closed
    }

    // ==================== Cycle ====================

    /// Fetch, exit-check, scan, filter, resolve, admit and execute.
    #[instrument(skip(self, provider))]
    pub async fn run_cycle(&self, provider: &dyn MarketDataProvider, now: DateTime<Utc>) -> CycleSummary {
        let snapshot = self.fetch_snapshot(provider, now).await;
        let mut summary = CycleSummary {
            fetched: snapshot.len(),
            ..Default::default()
        };
        summary.failed_fetches = self.fetch_targets(provider).len().saturating_sub(snapshot.len());

        summary.closed = self.check_exits(&snapshot, now).await.len();

        let outcome = self.scan_for_opportunities(&snapshot);
        summary.regime = outcome.regime;
        summary.detected = outcome.detected;
        summary.near_misses = outcome.near_misses;
        summary.signals = outcome.signals.len();

        let active = self.positions.active_symbols();
        let mut fresh = Vec::with_capacity(outcome.signals.len());
        for signal in outcome.signals {
            if signal.is_expired(now) {
                summary.expired += 1;
                signal.into_state(SignalState::Expired);
            } else if active.contains(signal.symbol()) {
                summary.skipped_active += 1;
                signal.into_state(SignalState::ConflictDropped);
            } else {
                fresh.push(signal);
            }
        }

        let resolution = self.resolve_conflicts(fresh);
        summary.conflict_dropped = resolution.dropped.len();
        // Paused signals are re-detected next cycle
        summary.paused = resolution.paused.len();

        let admission = self.apply_capital_constraints(resolution.kept);
        summary.capital_rejected = admission.rejected.len();

        let execution = self.execute_signals(admission.admitted, now).await;
        summary.expired += execution.expired.len();
        summary.skipped_active += execution.skipped_active.len();
        summary.capital_rejected += execution.capital_rejected.len();
        summary.executed = execution.opened.len();
        summary.failed = execution.failed.len();

        info!(
            regime = %summary.regime,
            fetched = summary.fetched,
            signals = summary.signals,
            executed = summary.executed,
            closed = summary.closed,
            rejected = summary.capital_rejected,
            "🔄 Cycle complete"
        );
        for pool in self.ledger.snapshot() {
            debug!(
                strategy = %pool.kind,
                used = %pool.used,
                available = %pool.available(),
                "Pool utilization {:.1}%",
                pool.utilization() * Decimal::ONE_HUNDRED
            );
        }

        summary
    }

    /// Configured universe, or everything the provider serves.
    fn universe(&self, provider: &dyn MarketDataProvider) -> Vec<String> {
        if self.config.scheduler.symbols.is_empty() {
            provider.symbols()
        } else {
            self.config.scheduler.symbols.clone()
        }
    }

    /// Symbols to fetch, flagged `true` when scanned. The regime reference is
    /// always fetched but only scanned when it belongs to the universe.
    fn fetch_targets(&self, provider: &dyn MarketDataProvider) -> Vec<(String, bool)> {
        let mut targets: Vec<(String, bool)> = self
            .universe(provider)
            .into_iter()
            .map(|symbol| (symbol, true))
            .collect();

        let reference = &self.config.scheduler.reference_symbol;
        if !targets.iter().any(|(symbol, _)| symbol == reference) {
            targets.push((reference.clone(), false));
        }
        targets
    }

    /// Fetch every symbol concurrently. A failed fetch drops only that symbol.
    pub async fn fetch_snapshot(&self, provider: &dyn MarketDataProvider, now: DateTime<Utc>) -> MarketSnapshot {
        let limit = self.config.scheduler.lookback_bars;
        let targets = self.fetch_targets(provider);

        let results = join_all(targets.into_iter().map(|(symbol, scanned)| async move {
            let result = provider.recent_bars(&symbol, limit).await;
            (symbol, scanned, result)
        }))
        .await;

        let mut snapshot = MarketSnapshot::new(now);
        for (symbol, scanned, result) in results {
            match result {
                Ok(bars) if scanned => snapshot.insert(symbol, bars),
                Ok(bars) => snapshot.insert_context(symbol, bars),
                Err(e) => warn!(%symbol, error = %e, "Market data fetch failed"),
            }
        }
        snapshot
    }
}

/// Decision and optional signal for one symbol x strategy.
struct Evaluation {
    decision: ScanDecisionRecord,
    signal: Option<Signal>,
}

impl Evaluation {
    fn skip(symbol: &str, kind: StrategyKind, now: DateTime<Utc>) -> Self {
        Self {
            decision: ScanDecisionRecord {
                timestamp: now,
                symbol: symbol.to_string(),
                strategy: kind,
                decision: ScanDecision::Skip,
                confidence: None,
                expected_value: None,
                reason: None,
                features: serde_json::Value::Null,
            },
            signal: None,
        }
    }
}

/// 0.4 x confidence + 0.3 x win rate + 0.3 x normalised expected value.
pub fn priority_score(confidence: f64, win_rate: f64, expected_value: f64, ev_normalization: f64) -> f64 {
    let ev_term = if ev_normalization > 0.0 {
        (expected_value / ev_normalization).clamp(0.0, 1.0)
    } else {
        0.0
    };
    CONFIDENCE_WEIGHT * confidence + WIN_RATE_WEIGHT * win_rate + EV_WEIGHT * ev_term
}
