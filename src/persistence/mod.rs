//! SQLite persistence for scan decisions and closed trades.
//!
//! Every symbol x strategy evaluation is recorded as Take / Skip / NearMiss
//! with the setup's feature snapshot, giving a dataset for later model
//! training. Closed trades are stored alongside for outcome labelling.

use crate::risk::ExitReason;
use crate::strategy::{StrategyKind, TradeSide};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Outcome of evaluating one symbol for one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanDecision {
    /// Became a signal
    Take,
    /// No setup detected
    Skip,
    /// Setup detected but failed the confidence or risk/reward floor
    NearMiss,
}

impl ScanDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanDecision::Take => "TAKE",
            ScanDecision::Skip => "SKIP",
            ScanDecision::NearMiss => "NEAR_MISS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanDecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub decision: ScanDecision,
    pub confidence: Option<f64>,
    pub expected_value: Option<f64>,
    pub reason: Option<String>,
    pub features: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTradeRecord {
    pub position_id: String,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub side: TradeSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub reason: ExitReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Sink for scan decisions and trade outcomes.
///
/// Callers log and swallow recorder errors; a failing store never stops a cycle.
pub trait ScanRecorder: Send + Sync {
    fn record(&self, decisions: &[ScanDecisionRecord]) -> Result<()>;

    fn record_closed_trade(&self, trade: &ClosedTradeRecord) -> Result<()>;
}

/// Discards everything; used for dry runs and when persistence is disabled.
#[derive(Debug, Default)]
pub struct NullRecorder;

impl ScanRecorder for NullRecorder {
    fn record(&self, _decisions: &[ScanDecisionRecord]) -> Result<()> {
        Ok(())
    }

    fn record_closed_trade(&self, _trade: &ClosedTradeRecord) -> Result<()> {
        Ok(())
    }
}

/// SQLite-backed recorder.
pub struct ScanStore {
    conn: Mutex<Connection>,
}

impl ScanStore {
    /// Open (or create) the database and its schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        info!("Scan store initialized at {:?}", db_path);
        Ok(store)
    }

    /// In-memory store for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(
            r#"
            -- One row per symbol x strategy x cycle
            CREATE TABLE IF NOT EXISTS scan_decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                symbol TEXT NOT NULL,
                strategy TEXT NOT NULL,
                decision TEXT NOT NULL,
                confidence REAL,
                expected_value REAL,
                reason TEXT,
                features TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_decisions_timestamp ON scan_decisions(timestamp);
            CREATE INDEX IF NOT EXISTS idx_decisions_symbol ON scan_decisions(symbol);

            -- Realised trade outcomes
            CREATE TABLE IF NOT EXISTS closed_trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                position_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                strategy TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                reason TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_closed_strategy ON closed_trades(strategy);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Decision counts keyed by decision name.
    pub fn decision_counts(&self) -> Result<HashMap<String, i64>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            r#"
            SELECT decision, COUNT(*)
            FROM scan_decisions
            GROUP BY decision
            "#,
        )?;

        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(counts)
    }

    /// Most recent decisions as (symbol, strategy, decision), newest first.
    pub fn recent_decisions(&self, limit: usize) -> Result<Vec<(String, String, String)>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            r#"
            SELECT symbol, strategy, decision
            FROM scan_decisions
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt
            .query_map([limit], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Total realised PnL per strategy.
    pub fn realized_pnl_by_strategy(&self) -> Result<HashMap<String, Decimal>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT strategy, realized_pnl FROM closed_trades")?;

        let mut totals: HashMap<String, Decimal> = HashMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (strategy, pnl) = row?;
            let pnl = Decimal::from_str(&pnl)
                .with_context(|| format!("Corrupt realized_pnl {:?} for strategy {}", pnl, strategy))?;
            *totals.entry(strategy).or_default() += pnl;
        }
        Ok(totals)
    }
}

impl ScanRecorder for ScanStore {
    fn record(&self, decisions: &[ScanDecisionRecord]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO scan_decisions
                    (timestamp, symbol, strategy, decision, confidence, expected_value, reason, features)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;
            for d in decisions {
                stmt.execute(params![
                    d.timestamp.to_rfc3339(),
                    d.symbol,
                    d.strategy.as_str(),
                    d.decision.as_str(),
                    d.confidence,
                    d.expected_value,
                    d.reason,
                    d.features.to_string(),
                ])?;
            }
        }
        tx.commit().context("Failed to commit scan decisions")?;

        debug!(count = decisions.len(), "Scan decisions recorded");
        Ok(())
    }

    fn record_closed_trade(&self, trade: &ClosedTradeRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            r#"
            INSERT INTO closed_trades
                (position_id, symbol, strategy, side, entry_price, exit_price, realized_pnl, reason, opened_at, closed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                trade.position_id,
                trade.symbol,
                trade.strategy.as_str(),
                trade.side.to_string(),
                trade.entry_price.to_string(),
                trade.exit_price.to_string(),
                trade.realized_pnl.to_string(),
                trade.reason.to_string(),
                trade.opened_at.to_rfc3339(),
                trade.closed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn decision(symbol: &str, strategy: StrategyKind, decision: ScanDecision) -> ScanDecisionRecord {
        ScanDecisionRecord {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            strategy,
            decision,
            confidence: Some(0.61),
            expected_value: Some(0.012),
            reason: None,
            features: json!({ "strategy": strategy.as_str(), "strength": 0.7 }),
        }
    }

    #[test]
    fn test_record_decisions() {
        let store = ScanStore::open_in_memory().unwrap();

        store
            .record(&[
                decision("BTCUSDT", StrategyKind::Channel, ScanDecision::Take),
                decision("BTCUSDT", StrategyKind::Swing, ScanDecision::Skip),
                decision("ETHUSDT", StrategyKind::Dca, ScanDecision::NearMiss),
                decision("ETHUSDT", StrategyKind::Channel, ScanDecision::Skip),
            ])
            .unwrap();

        let counts = store.decision_counts().unwrap();
        assert_eq!(counts["SKIP"], 2);
        assert_eq!(counts["TAKE"], 1);
        assert_eq!(counts["NEAR_MISS"], 1);

        let recent = store.recent_decisions(1).unwrap();
        assert_eq!(
            recent[0],
            ("ETHUSDT".to_string(), "channel".to_string(), "SKIP".to_string())
        );
    }

    #[test]
    fn test_closed_trades_pnl() {
        let store = ScanStore::open_in_memory().unwrap();
        let trade = |pnl: Decimal, strategy| ClosedTradeRecord {
            position_id: "PAPER-1".to_string(),
            symbol: "SOLUSDT".to_string(),
            strategy,
            side: TradeSide::Buy,
            entry_price: dec!(100),
            exit_price: dec!(104),
            realized_pnl: pnl,
            reason: ExitReason::TakeProfit,
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        };

        store.record_closed_trade(&trade(dec!(12.5), StrategyKind::Swing)).unwrap();
        store.record_closed_trade(&trade(dec!(-4), StrategyKind::Swing)).unwrap();
        store.record_closed_trade(&trade(dec!(7), StrategyKind::Dca)).unwrap();

        let pnl = store.realized_pnl_by_strategy().unwrap();
        assert_eq!(pnl["swing"], dec!(8.5));
        assert_eq!(pnl["dca"], dec!(7));
    }

    #[test]
    fn test_corrupt_pnl_row_is_an_error() {
        let store = ScanStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                r#"
                INSERT INTO closed_trades
                    (position_id, symbol, strategy, side, entry_price, exit_price, realized_pnl, reason, opened_at, closed_at)
                VALUES ('PAPER-9', 'SOLUSDT', 'swing', 'BUY', '100', '104', 'not-a-number', 'TAKE_PROFIT', '', '')
                "#,
                [],
            )
            .unwrap();
        }

        let err = store.realized_pnl_by_strategy().unwrap_err();
        assert!(err.to_string().contains("Corrupt realized_pnl"));
    }

    #[test]
    fn test_null_recorder_accepts_everything() {
        let recorder = NullRecorder;
        assert!(recorder
            .record(&[decision("BTCUSDT", StrategyKind::Channel, ScanDecision::Take)])
            .is_ok());
    }
}
