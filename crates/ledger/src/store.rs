use parking_lot::RwLock;
use thiserror::Error;

use stockline_core::{StockKey, TenantId};

use crate::entry::StockMovementEntry;
use crate::query::{LedgerFilter, LedgerQueryResult, Pagination};

/// Ledger operation error.
///
/// Appends only fail on malformed batches; there is no error path for
/// update or delete because those operations do not exist.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
}

/// Append-only, tenant-scoped movement ledger.
///
/// ## Append semantics
///
/// `append()` persists one transaction's entries atomically: all entries in
/// a batch must belong to the same tenant, and either the whole batch lands
/// or none of it does. Per (store, variant), entries arrive in causal
/// operation order because the engine appends while holding that key's lock.
///
/// ## Query semantics
///
/// `query()` is read-only, filtered, paginated, and returns entries in
/// timestamp order. `entries_for_key()` returns one key's entries in append
/// order, which is what replay-based reconciliation wants.
pub trait LedgerStore: Send + Sync {
    fn append(&self, entries: Vec<StockMovementEntry>) -> Result<(), LedgerError>;

    fn query(
        &self,
        tenant_id: TenantId,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> Result<LedgerQueryResult, LedgerError>;

    fn entries_for_key(
        &self,
        tenant_id: TenantId,
        key: StockKey,
    ) -> Result<Vec<StockMovementEntry>, LedgerError>;
}

impl<S> LedgerStore for std::sync::Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn append(&self, entries: Vec<StockMovementEntry>) -> Result<(), LedgerError> {
        (**self).append(entries)
    }

    fn query(
        &self,
        tenant_id: TenantId,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> Result<LedgerQueryResult, LedgerError> {
        (**self).query(tenant_id, filter, pagination)
    }

    fn entries_for_key(
        &self,
        tenant_id: TenantId,
        key: StockKey,
    ) -> Result<Vec<StockMovementEntry>, LedgerError> {
        (**self).entries_for_key(tenant_id, key)
    }
}

/// Sum of deltas over a replayed entry slice.
///
/// For entries belonging to one (store, variant), this equals the key's
/// current on-hand minus its initial on-hand.
pub fn replay_on_hand(entries: &[StockMovementEntry]) -> i64 {
    entries.iter().map(|e| e.delta).sum()
}

/// In-memory append-only ledger.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    entries: RwLock<Vec<StockMovementEntry>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all tenants (test helper).
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append(&self, entries: Vec<StockMovementEntry>) -> Result<(), LedgerError> {
        if entries.is_empty() {
            return Ok(());
        }

        // All entries must belong to the same tenant's transaction.
        let tenant_id = entries[0].tenant_id;
        for (idx, e) in entries.iter().enumerate() {
            if e.tenant_id != tenant_id {
                return Err(LedgerError::TenantIsolation(format!(
                    "batch contains multiple tenant_ids (index {idx})"
                )));
            }
        }

        self.entries.write().extend(entries);
        Ok(())
    }

    fn query(
        &self,
        tenant_id: TenantId,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> Result<LedgerQueryResult, LedgerError> {
        let all = self.entries.read();

        let mut matched: Vec<StockMovementEntry> = all
            .iter()
            .filter(|e| e.tenant_id == tenant_id && filter.matches(e))
            .cloned()
            .collect();

        // Stable sort: ties in occurred_at keep append order.
        matched.sort_by_key(|e| e.occurred_at);

        let total = matched.len() as u64;
        let offset = pagination.offset as usize;
        let limit = pagination.limit as usize;
        let entries: Vec<StockMovementEntry> =
            matched.into_iter().skip(offset).take(limit).collect();
        let has_more = (offset + entries.len()) < total as usize;

        Ok(LedgerQueryResult {
            entries,
            total,
            pagination,
            has_more,
        })
    }

    fn entries_for_key(
        &self,
        tenant_id: TenantId,
        key: StockKey,
    ) -> Result<Vec<StockMovementEntry>, LedgerError> {
        let all = self.entries.read();
        Ok(all
            .iter()
            .filter(|e| e.tenant_id == tenant_id && e.key() == key)
            .cloned()
            .collect())
    }
}
