//! Per-strategy capital pools.
//!
//! The ledger is the only place pool usage changes. `reserve` is an atomic
//! check-and-commit, so concurrent callers can never push a pool past its
//! ceiling.

use super::setup::StrategyKind;
use crate::config::CapitalConfig;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Capital slice owned by one strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPool {
    pub kind: StrategyKind,
    /// Fraction of total capital
    pub allocation_fraction: Decimal,
    /// allocation_fraction x total capital
    pub capacity: Decimal,
    pub used: Decimal,
}

impl AllocationPool {
    pub fn available(&self) -> Decimal {
        (self.capacity - self.used).max(Decimal::ZERO)
    }

    pub fn utilization(&self) -> Decimal {
        if self.capacity.is_zero() {
            return Decimal::ZERO;
        }
        self.used / self.capacity
    }
}

pub struct CapitalLedger {
    total_capital: Decimal,
    pools: Mutex<HashMap<StrategyKind, AllocationPool>>,
}

impl CapitalLedger {
    pub fn new(config: &CapitalConfig) -> Self {
        let pools = StrategyKind::ALL
            .into_iter()
            .map(|kind| {
                let fraction = config.allocations.get(kind).allocation_fraction;
                let pool = AllocationPool {
                    kind,
                    allocation_fraction: fraction,
                    capacity: config.total_capital * fraction,
                    used: Decimal::ZERO,
                };
                (kind, pool)
            })
            .collect();

        Self {
            total_capital: config.total_capital,
            pools: Mutex::new(pools),
        }
    }

    pub fn total_capital(&self) -> Decimal {
        self.total_capital
    }

    /// Commit `amount` to the pool if it fits. Returns false and changes nothing otherwise.
    pub fn reserve(&self, kind: StrategyKind, amount: Decimal) -> bool {
        if amount <= Decimal::ZERO {
            return false;
        }

        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pool) = pools.get_mut(&kind) else {
            return false;
        };
        if amount > pool.available() {
            debug!(strategy = %kind, %amount, available = %pool.available(), "Reservation refused");
            return false;
        }

        pool.used += amount;
        debug!(strategy = %kind, %amount, used = %pool.used, "Capital reserved");
        true
    }

    /// Return `amount` to the pool. Over-release is clamped at zero usage.
    pub fn release(&self, kind: StrategyKind, amount: Decimal) {
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(pool) = pools.get_mut(&kind) else {
            return;
        };

        if amount > pool.used {
            warn!(strategy = %kind, %amount, used = %pool.used, "Releasing more capital than reserved");
            pool.used = Decimal::ZERO;
        } else {
            pool.used -= amount;
        }
        debug!(strategy = %kind, %amount, used = %pool.used, "Capital released");
    }

    pub fn available(&self, kind: StrategyKind) -> Decimal {
        self.pool(kind).map_or(Decimal::ZERO, |p| p.available())
    }

    pub fn pool(&self, kind: StrategyKind) -> Option<AllocationPool> {
        let pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        pools.get(&kind).cloned()
    }

    /// All pools in `StrategyKind::ALL` order.
    pub fn snapshot(&self) -> Vec<AllocationPool> {
        let pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        StrategyKind::ALL
            .iter()
            .filter_map(|kind| pools.get(kind).cloned())
            .collect()
    }
}
