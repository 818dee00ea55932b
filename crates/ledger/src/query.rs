//! Ledger query interface for reporting and export collaborators.
//!
//! Read-only, tenant-scoped, paginated by default. Entries come back in
//! timestamp order (ties resolved by append order).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{EntityId, StoreId, VariantId};

use crate::entry::{RefType, StockMovementEntry};

/// Pagination parameters for ledger queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of entries to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000), // Cap at 1000 for safety
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for ledger queries. All fields are optional and combine
/// with AND semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerFilter {
    pub store_id: Option<StoreId>,
    pub variant_id: Option<VariantId>,
    pub ref_type: Option<RefType>,
    pub ref_id: Option<EntityId>,
    /// Entries that occurred at or after this time.
    pub occurred_after: Option<DateTime<Utc>>,
    /// Entries that occurred at or before this time.
    pub occurred_before: Option<DateTime<Utc>>,
    /// Case-insensitive substring match against the entry's rendered ids,
    /// ref tag, and actor.
    pub text: Option<String>,
}

impl LedgerFilter {
    pub fn for_key(store_id: StoreId, variant_id: VariantId) -> Self {
        Self {
            store_id: Some(store_id),
            variant_id: Some(variant_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &StockMovementEntry) -> bool {
        if let Some(store_id) = self.store_id {
            if entry.store_id != store_id {
                return false;
            }
        }
        if let Some(variant_id) = self.variant_id {
            if entry.variant_id != variant_id {
                return false;
            }
        }
        if let Some(ref_type) = self.ref_type {
            if entry.ref_type != ref_type {
                return false;
            }
        }
        if let Some(ref_id) = self.ref_id {
            if entry.ref_id != ref_id {
                return false;
            }
        }
        if let Some(after) = self.occurred_after {
            if entry.occurred_at < after {
                return false;
            }
        }
        if let Some(before) = self.occurred_before {
            if entry.occurred_at > before {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let haystack = format!(
                "{} {} {} {} {} {}",
                entry.store_id,
                entry.variant_id,
                entry.ref_type,
                entry.ref_id,
                entry.actor_id,
                entry.entry_id,
            );
            if !haystack.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// Paginated ledger query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerQueryResult {
    /// The entries matching the query, in timestamp order.
    pub entries: Vec<StockMovementEntry>,
    /// Total number of entries matching the filter (across all pages).
    pub total: u64,
    /// Pagination parameters used.
    pub pagination: Pagination,
    /// Whether there are more entries available.
    pub has_more: bool,
}
