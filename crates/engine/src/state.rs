//! Current-quantity state and per-key locking.
//!
//! The (tenant, store, variant) entry is the unit of locking: the engine
//! takes an exclusive lock on each entry before reading or writing its
//! quantities. Operations touching several keys acquire their locks in
//! ascending key order with a bounded deadline, so opposing transfers can
//! never deadlock and contention surfaces as a retryable `LockTimeout`.
//!
//! Lock ordering rule: the outer map lock is never held while acquiring a
//! cell, and cells are never acquired out of key order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};

use stockline_core::{EngineError, EngineResult, StockKey, TenantId};

/// Mutable quantities for one (store, variant).
///
/// `reserved` counts stock held against pending commitments; it is part of
/// `on_hand` until a reservation commits. `available` is what can be
/// freshly reserved or sold.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ItemCell {
    pub on_hand: i64,
    pub reserved: i64,
}

impl ItemCell {
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }
}

/// Read-only view of one stock position, returned from engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub key: StockKey,
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
}

impl StockSnapshot {
    pub fn of(key: StockKey, cell: &ItemCell) -> Self {
        Self {
            key,
            on_hand: cell.on_hand,
            reserved: cell.reserved,
            available: cell.available(),
        }
    }
}

/// Keyed store of live quantities; the only place current stock lives.
///
/// Entries are created lazily with zero quantities on first touch. The map
/// itself is only locked long enough to fetch or insert a cell handle;
/// all quantity access goes through the per-cell mutex.
#[derive(Debug, Default)]
pub struct InventoryState {
    cells: RwLock<HashMap<(TenantId, StockKey), Arc<Mutex<ItemCell>>>>,
}

impl InventoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for one key's cell, creating it if absent.
    pub fn cell(&self, tenant_id: TenantId, key: StockKey) -> Arc<Mutex<ItemCell>> {
        if let Some(cell) = self.cells.read().get(&(tenant_id, key)) {
            return Arc::clone(cell);
        }
        Arc::clone(
            self.cells
                .write()
                .entry((tenant_id, key))
                .or_default(),
        )
    }

    /// Handles for a key set, deduplicated and sorted into canonical lock
    /// order. Returns the keys alongside so callers can zip guards to keys.
    pub fn cells_for(
        &self,
        tenant_id: TenantId,
        keys: impl IntoIterator<Item = StockKey>,
    ) -> Vec<(StockKey, Arc<Mutex<ItemCell>>)> {
        let mut keys: Vec<StockKey> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();
        keys.into_iter()
            .map(|key| (key, self.cell(tenant_id, key)))
            .collect()
    }

    /// Current snapshot of one key (zeroes if never touched).
    pub fn snapshot(&self, tenant_id: TenantId, key: StockKey) -> StockSnapshot {
        let cell = self.cell(tenant_id, key);
        let guard = cell.lock();
        StockSnapshot::of(key, &guard)
    }
}

/// Acquire every cell in order, each bounded by `deadline`.
///
/// On timeout nothing stays locked (guards taken so far drop) and the
/// caller gets `LockTimeout` — retryable, nothing applied.
pub fn lock_all<'a>(
    cells: &'a [(StockKey, Arc<Mutex<ItemCell>>)],
    deadline: Instant,
) -> EngineResult<Vec<MutexGuard<'a, ItemCell>>> {
    let mut guards = Vec::with_capacity(cells.len());
    for (key, cell) in cells {
        match cell.try_lock_until(deadline) {
            Some(guard) => guards.push(guard),
            None => {
                tracing::warn!(key = %key, "stock lock acquisition timed out");
                return Err(EngineError::LockTimeout);
            }
        }
    }
    Ok(guards)
}
