//! Domain events published by the engine, one per committed transaction.
//!
//! A closed tagged enum, one case per operation shape, exhaustively
//! matched for its wire tag — consumers get a stable `event_type` and a
//! payload specific to the business reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{EntityId, StoreId, TenantId, VariantId};
use stockline_counts::{CountSessionId, CountVariance};
use stockline_events::Event;
use stockline_ledger::RefType;
use stockline_purchasing::PurchaseOrderId;
use stockline_transfers::TransferId;

use crate::reservation::ReservationId;

/// Quantity moved for one transfer line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLineDelta {
    pub variant_id: VariantId,
    pub qty: i64,
}

/// One line of a receive call (transfer or purchase order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub variant_id: VariantId,
    pub qty: i64,
}

/// Event: a single stock position changed quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChanged {
    pub tenant_id: TenantId,
    pub store_id: StoreId,
    pub variant_id: VariantId,
    pub ref_type: RefType,
    pub ref_id: EntityId,
    pub delta: i64,
    pub old_on_hand: i64,
    pub new_on_hand: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a transfer left its source store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSent {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub from_store_id: StoreId,
    pub to_store_id: StoreId,
    pub lines: Vec<TransferLineDelta>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: quantities arrived at a transfer's destination store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceived {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub from_store_id: StoreId,
    pub to_store_id: StoreId,
    pub lines: Vec<TransferLineDelta>,
    /// Whether every line is now fully received.
    pub complete: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a transfer was cancelled; in-transit quantities returned to the
/// source store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCancelled {
    pub tenant_id: TenantId,
    pub transfer_id: TransferId,
    pub from_store_id: StoreId,
    pub to_store_id: StoreId,
    pub restocked: Vec<TransferLineDelta>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a count session committed its reconciliation deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountFinalized {
    pub tenant_id: TenantId,
    pub session_id: CountSessionId,
    pub store_id: StoreId,
    pub variances: Vec<CountVariance>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: quantities arrived against a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderReceived {
    pub tenant_id: TenantId,
    pub purchase_order_id: PurchaseOrderId,
    pub store_id: StoreId,
    pub receipts: Vec<ReceiptLine>,
    /// Whether every line is now fully received.
    pub complete: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: quantity was put on hold against a stock position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationHeld {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub store_id: StoreId,
    pub variant_id: VariantId,
    pub qty: i64,
    pub ref_type: RefType,
    pub ref_id: EntityId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a held reservation became a final deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationCommitted {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub store_id: StoreId,
    pub variant_id: VariantId,
    pub qty: i64,
    pub ref_type: RefType,
    pub ref_id: EntityId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a held reservation was released back to available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReleased {
    pub tenant_id: TenantId,
    pub reservation_id: ReservationId,
    pub store_id: StoreId,
    pub variant_id: VariantId,
    pub qty: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    StockChanged(StockChanged),
    TransferSent(TransferSent),
    TransferReceived(TransferReceived),
    TransferCancelled(TransferCancelled),
    CountFinalized(CountFinalized),
    PurchaseOrderReceived(PurchaseOrderReceived),
    ReservationHeld(ReservationHeld),
    ReservationCommitted(ReservationCommitted),
    ReservationReleased(ReservationReleased),
}

impl Event for DomainEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::StockChanged(_) => "stock.changed",
            DomainEvent::TransferSent(_) => "transfer.sent",
            DomainEvent::TransferReceived(_) => "transfer.received",
            DomainEvent::TransferCancelled(_) => "transfer.cancelled",
            DomainEvent::CountFinalized(_) => "count.finalized",
            DomainEvent::PurchaseOrderReceived(_) => "purchase_order.received",
            DomainEvent::ReservationHeld(_) => "reservation.held",
            DomainEvent::ReservationCommitted(_) => "reservation.committed",
            DomainEvent::ReservationReleased(_) => "reservation.released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::StockChanged(e) => e.occurred_at,
            DomainEvent::TransferSent(e) => e.occurred_at,
            DomainEvent::TransferReceived(e) => e.occurred_at,
            DomainEvent::TransferCancelled(e) => e.occurred_at,
            DomainEvent::CountFinalized(e) => e.occurred_at,
            DomainEvent::PurchaseOrderReceived(e) => e.occurred_at,
            DomainEvent::ReservationHeld(e) => e.occurred_at,
            DomainEvent::ReservationCommitted(e) => e.occurred_at,
            DomainEvent::ReservationReleased(e) => e.occurred_at,
        }
    }
}
