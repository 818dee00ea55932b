use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockline_core::{ActorId, EntityId, StockKey, StoreId, TenantId, VariantId};

/// Business reason behind a ledger entry.
///
/// One canonical tag per business meaning; no tag is ever reused for an
/// unrelated operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    Sale,
    TransferOut,
    TransferIn,
    CountReconcile,
    PurchaseOrderReceipt,
    Waste,
    Adjustment,
    ReservationCommit,
    ReservationRelease,
}

impl RefType {
    /// Stable wire tag, also used by the free-text ledger filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            RefType::Sale => "sale",
            RefType::TransferOut => "transfer_out",
            RefType::TransferIn => "transfer_in",
            RefType::CountReconcile => "count_reconcile",
            RefType::PurchaseOrderReceipt => "purchase_order_receipt",
            RefType::Waste => "waste",
            RefType::Adjustment => "adjustment",
            RefType::ReservationCommit => "reservation_commit",
            RefType::ReservationRelease => "reservation_release",
        }
    }
}

impl core::fmt::Display for RefType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable movement of stock.
///
/// Entries are appended inside the same transaction that mutates inventory
/// state; `resulting_on_hand` snapshots the key's on-hand immediately after
/// `delta` was applied. For a given (store, variant), replaying all entries
/// in order and summing `delta` must equal the current on-hand exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementEntry {
    pub entry_id: Uuid,
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub variant_id: VariantId,
    pub ref_type: RefType,
    /// Id of the originating workflow object (transfer, session, order, ...).
    pub ref_id: EntityId,
    pub delta: i64,
    pub resulting_on_hand: i64,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: ActorId,
}

impl StockMovementEntry {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.store_id, self.variant_id)
    }
}
