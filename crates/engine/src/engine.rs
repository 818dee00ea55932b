//! The movement engine: every stock-affecting action as one atomic
//! operation.
//!
//! Operation shape, in order: acquire the workflow entity lock (if any),
//! then the stock cell locks in ascending key order, validate everything,
//! append the transaction's ledger entries, mutate quantities and workflow
//! state, publish exactly one event, return the new snapshot. Every
//! validation failure returns before the first mutation; `LockTimeout` is
//! the only contention error and never partially applies.

use std::time::Instant;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use stockline_core::{
    ActorId, EngineError, EngineResult, EntityId, StockKey, StoreId, TenantId, TenantPolicy,
    VariantId,
};
use stockline_counts::{CountScope, CountSession, CountSessionId, CountVariance};
use stockline_events::{EventEnvelope, EventPublisher};
use stockline_ledger::{
    LedgerError, LedgerFilter, LedgerQueryResult, LedgerStore, Pagination, RefType,
    StockMovementEntry,
};
use stockline_purchasing::{PurchaseOrder, PurchaseOrderId, PurchaseOrderStatus, VendorId};
use stockline_transfers::{Transfer, TransferId, TransferStatus};

use crate::config::EngineConfig;
use crate::directory::Directory;
use crate::events::{
    CountFinalized, DomainEvent, PurchaseOrderReceived, ReceiptLine, ReservationCommitted,
    ReservationHeld, ReservationReleased, StockChanged, TransferCancelled, TransferLineDelta,
    TransferReceived, TransferSent,
};
use crate::policy::PolicyStore;
use crate::reservation::{Reservation, ReservationId};
use crate::state::{InventoryState, StockSnapshot, lock_all};

/// Business reason for a manual adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentKind {
    /// Stock physically lost (damage, spoilage, shrinkage). Removes only.
    Waste,
    /// Manual correction in either direction.
    Correction,
}

impl AdjustmentKind {
    fn ref_type(self) -> RefType {
        match self {
            AdjustmentKind::Waste => RefType::Waste,
            AdjustmentKind::Correction => RefType::Adjustment,
        }
    }
}

fn lock_entity<'a, T>(cell: &'a Mutex<T>, deadline: Instant) -> EngineResult<MutexGuard<'a, T>> {
    cell.try_lock_until(deadline).ok_or(EngineError::LockTimeout)
}

fn ledger_err(e: LedgerError) -> EngineError {
    EngineError::Ledger(e.to_string())
}

/// Transactional core over a ledger store and an event publisher.
///
/// Inventory quantities live only in the engine's [`InventoryState`];
/// workflow objects live in per-entity-locked directories so lifecycle
/// transitions serialize with in-flight operations on the same entity.
#[derive(Debug)]
pub struct MovementEngine<L, P> {
    config: EngineConfig,
    policies: PolicyStore,
    state: InventoryState,
    ledger: L,
    publisher: P,
    transfers: Directory<TransferId, Transfer>,
    counts: Directory<CountSessionId, CountSession>,
    purchase_orders: Directory<PurchaseOrderId, PurchaseOrder>,
    reservations: Directory<ReservationId, Reservation>,
}

impl<L, P> MovementEngine<L, P>
where
    L: LedgerStore,
    P: EventPublisher<EventEnvelope<DomainEvent>>,
{
    pub fn new(ledger: L, publisher: P) -> Self {
        Self::with_config(ledger, publisher, EngineConfig::default())
    }

    pub fn with_config(ledger: L, publisher: P, config: EngineConfig) -> Self {
        Self {
            config,
            policies: PolicyStore::new(),
            state: InventoryState::new(),
            ledger,
            publisher,
            transfers: Directory::new(),
            counts: Directory::new(),
            purchase_orders: Directory::new(),
            reservations: Directory::new(),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn set_tenant_policy(&self, tenant_id: TenantId, policy: TenantPolicy) {
        self.policies.set(tenant_id, policy);
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.lock_timeout
    }

    #[allow(clippy::too_many_arguments)]
    fn entry(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        ref_type: RefType,
        ref_id: EntityId,
        delta: i64,
        resulting_on_hand: i64,
        occurred_at: chrono::DateTime<Utc>,
        actor_id: ActorId,
    ) -> StockMovementEntry {
        StockMovementEntry {
            entry_id: Uuid::now_v7(),
            tenant_id,
            store_id: key.store_id,
            variant_id: key.variant_id,
            ref_type,
            ref_id,
            delta,
            resulting_on_hand,
            occurred_at,
            actor_id,
        }
    }

    fn append(&self, entries: Vec<StockMovementEntry>) -> EngineResult<()> {
        self.ledger.append(entries).map_err(ledger_err)
    }

    fn publish(&self, tenant_id: TenantId, event: DomainEvent) -> EngineResult<()> {
        self.publisher
            .publish(EventEnvelope::wrap(tenant_id, event))
            .map_err(|e| EngineError::Publish(format!("{e:?}")))
    }

    // ---- direct stock operations -------------------------------------

    /// Sell `qty` out of one stock position.
    pub fn apply_sale(
        &self,
        tenant_id: TenantId,
        store_id: StoreId,
        variant_id: VariantId,
        qty: i64,
        ref_id: EntityId,
        actor_id: ActorId,
    ) -> EngineResult<StockSnapshot> {
        if qty <= 0 {
            return Err(EngineError::validation("sale quantity must be positive"));
        }
        let policy = self.policies.get(tenant_id);
        let key = StockKey::new(store_id, variant_id);
        let cell = self.state.cell(tenant_id, key);
        let mut guard = lock_entity(cell.as_ref(), self.deadline())?;

        let available = guard.available();
        if !policy.allow_backorders && available < qty {
            return Err(EngineError::insufficient_stock(qty, available));
        }

        let occurred_at = Utc::now();
        let old_on_hand = guard.on_hand;
        let new_on_hand = old_on_hand - qty;
        self.append(vec![self.entry(
            tenant_id,
            key,
            RefType::Sale,
            ref_id,
            -qty,
            new_on_hand,
            occurred_at,
            actor_id,
        )])?;
        guard.on_hand = new_on_hand;

        debug!(tenant = %tenant_id, key = %key, delta = -qty, "sale applied");
        self.publish(
            tenant_id,
            DomainEvent::StockChanged(StockChanged {
                tenant_id,
                store_id,
                variant_id,
                ref_type: RefType::Sale,
                ref_id,
                delta: -qty,
                old_on_hand,
                new_on_hand,
                occurred_at,
            }),
        )?;
        Ok(StockSnapshot::of(key, &guard))
    }

    /// Manual adjustment (waste, shrinkage, correction).
    #[allow(clippy::too_many_arguments)]
    pub fn adjust(
        &self,
        tenant_id: TenantId,
        store_id: StoreId,
        variant_id: VariantId,
        delta: i64,
        kind: AdjustmentKind,
        ref_id: EntityId,
        actor_id: ActorId,
    ) -> EngineResult<StockSnapshot> {
        if delta == 0 {
            return Err(EngineError::validation("adjustment delta cannot be zero"));
        }
        if kind == AdjustmentKind::Waste && delta > 0 {
            return Err(EngineError::validation("waste adjustments must remove stock"));
        }
        let policy = self.policies.get(tenant_id);
        let key = StockKey::new(store_id, variant_id);
        let cell = self.state.cell(tenant_id, key);
        let mut guard = lock_entity(cell.as_ref(), self.deadline())?;

        let old_on_hand = guard.on_hand;
        let new_on_hand = old_on_hand + delta;
        if new_on_hand < 0 && !policy.allow_backorders {
            return Err(EngineError::BackorderNotAllowed);
        }

        let ref_type = kind.ref_type();
        let occurred_at = Utc::now();
        self.append(vec![self.entry(
            tenant_id,
            key,
            ref_type,
            ref_id,
            delta,
            new_on_hand,
            occurred_at,
            actor_id,
        )])?;
        guard.on_hand = new_on_hand;

        debug!(tenant = %tenant_id, key = %key, delta, reason = %ref_type, "adjustment applied");
        self.publish(
            tenant_id,
            DomainEvent::StockChanged(StockChanged {
                tenant_id,
                store_id,
                variant_id,
                ref_type,
                ref_id,
                delta,
                old_on_hand,
                new_on_hand,
                occurred_at,
            }),
        )?;
        Ok(StockSnapshot::of(key, &guard))
    }

    /// Current quantities for one stock position.
    pub fn stock_snapshot(
        &self,
        tenant_id: TenantId,
        store_id: StoreId,
        variant_id: VariantId,
    ) -> StockSnapshot {
        self.state
            .snapshot(tenant_id, StockKey::new(store_id, variant_id))
    }

    // ---- ledger queries ----------------------------------------------

    pub fn query_ledger(
        &self,
        tenant_id: TenantId,
        filter: &LedgerFilter,
        pagination: Pagination,
    ) -> EngineResult<LedgerQueryResult> {
        self.ledger
            .query(tenant_id, filter, pagination)
            .map_err(ledger_err)
    }

    pub fn ledger_entries_for_key(
        &self,
        tenant_id: TenantId,
        store_id: StoreId,
        variant_id: VariantId,
    ) -> EngineResult<Vec<StockMovementEntry>> {
        self.ledger
            .entries_for_key(tenant_id, StockKey::new(store_id, variant_id))
            .map_err(ledger_err)
    }

    // ---- transfers ----------------------------------------------------

    pub fn create_transfer(
        &self,
        tenant_id: TenantId,
        from_store_id: StoreId,
        to_store_id: StoreId,
    ) -> EngineResult<TransferId> {
        let id = TransferId::new(EntityId::new());
        let transfer = Transfer::new(id, tenant_id, from_store_id, to_store_id, Utc::now())?;
        self.transfers.insert(id, transfer);
        debug!(tenant = %tenant_id, transfer = %id, "transfer created");
        Ok(id)
    }

    pub fn add_transfer_line(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        variant_id: VariantId,
        qty: i64,
    ) -> EngineResult<()> {
        let cell = self
            .transfers
            .cell(&transfer_id)
            .ok_or_else(EngineError::not_found)?;
        let mut transfer = lock_entity(cell.as_ref(), self.deadline())?;
        if transfer.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        transfer.add_line(variant_id, qty)
    }

    pub fn update_transfer_line(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        variant_id: VariantId,
        qty: i64,
    ) -> EngineResult<()> {
        let cell = self
            .transfers
            .cell(&transfer_id)
            .ok_or_else(EngineError::not_found)?;
        let mut transfer = lock_entity(cell.as_ref(), self.deadline())?;
        if transfer.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        transfer.set_line_qty(variant_id, qty)
    }

    pub fn get_transfer(&self, tenant_id: TenantId, transfer_id: TransferId) -> EngineResult<Transfer> {
        let cell = self
            .transfers
            .cell(&transfer_id)
            .ok_or_else(EngineError::not_found)?;
        let transfer = lock_entity(cell.as_ref(), self.deadline())?;
        if transfer.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        Ok(transfer.clone())
    }

    /// Deduct every line's unsent quantity from the source store and mark
    /// the transfer in transit. All lines must be satisfiable or the whole
    /// send is rejected — no partial send across lines.
    pub fn transfer_send(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        actor_id: ActorId,
    ) -> EngineResult<Transfer> {
        let deadline = self.deadline();
        let cell = self
            .transfers
            .cell(&transfer_id)
            .ok_or_else(EngineError::not_found)?;
        let mut transfer = lock_entity(cell.as_ref(), deadline)?;
        if transfer.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        if transfer.status() != TransferStatus::Draft {
            return Err(EngineError::invalid_transition(
                "only draft transfers can be sent",
            ));
        }
        if transfer.lines().is_empty() {
            return Err(EngineError::validation("cannot send transfer without lines"));
        }

        let from = transfer.from_store_id();
        let cells = self.state.cells_for(
            tenant_id,
            transfer
                .lines()
                .iter()
                .map(|l| StockKey::new(from, l.variant_id)),
        );
        let mut guards = lock_all(&cells, deadline)?;

        let occurred_at = Utc::now();
        let mut entries = Vec::new();
        let mut sent = Vec::new();
        let mut planned = Vec::new();
        for (idx, (key, _)) in cells.iter().enumerate() {
            let Some(line) = transfer.line(key.variant_id) else {
                continue;
            };
            let unsent = line.qty_unsent();
            if unsent <= 0 {
                continue;
            }
            let on_hand = guards[idx].on_hand;
            if on_hand < unsent {
                return Err(EngineError::insufficient_stock(unsent, on_hand));
            }
            entries.push(self.entry(
                tenant_id,
                *key,
                RefType::TransferOut,
                transfer_id.0,
                -unsent,
                on_hand - unsent,
                occurred_at,
                actor_id,
            ));
            sent.push(TransferLineDelta {
                variant_id: key.variant_id,
                qty: unsent,
            });
            planned.push((idx, unsent));
        }

        self.append(entries)?;
        for (idx, qty) in planned {
            guards[idx].on_hand -= qty;
        }
        transfer.mark_sent()?;

        debug!(tenant = %tenant_id, transfer = %transfer_id, lines = sent.len(), "transfer sent");
        self.publish(
            tenant_id,
            DomainEvent::TransferSent(TransferSent {
                tenant_id,
                transfer_id,
                from_store_id: from,
                to_store_id: transfer.to_store_id(),
                lines: sent,
                occurred_at,
            }),
        )?;
        Ok(transfer.clone())
    }

    /// Receive quantities at the destination store, possibly partially.
    pub fn transfer_receive(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        receipts: &[ReceiptLine],
        actor_id: ActorId,
    ) -> EngineResult<Transfer> {
        if receipts.is_empty() {
            return Err(EngineError::validation("receive requires at least one line"));
        }
        let deadline = self.deadline();
        let cell = self
            .transfers
            .cell(&transfer_id)
            .ok_or_else(EngineError::not_found)?;
        let mut transfer = lock_entity(cell.as_ref(), deadline)?;
        if transfer.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        if !matches!(
            transfer.status(),
            TransferStatus::InTransit | TransferStatus::PartialReceived
        ) {
            return Err(EngineError::invalid_transition(
                "transfer is not receivable in its current status",
            ));
        }
        for (i, receipt) in receipts.iter().enumerate() {
            if receipt.qty <= 0 {
                return Err(EngineError::validation("receive quantity must be positive"));
            }
            if receipts[..i].iter().any(|r| r.variant_id == receipt.variant_id) {
                return Err(EngineError::validation(
                    "duplicate variant in receive lines",
                ));
            }
            let line = transfer.line(receipt.variant_id).ok_or_else(|| {
                EngineError::validation("transfer has no line for this variant")
            })?;
            if receipt.qty > line.qty_remaining() {
                return Err(EngineError::validation(format!(
                    "receive quantity {} exceeds remaining in-transit {}",
                    receipt.qty,
                    line.qty_remaining()
                )));
            }
        }

        let to = transfer.to_store_id();
        let cells = self.state.cells_for(
            tenant_id,
            receipts.iter().map(|r| StockKey::new(to, r.variant_id)),
        );
        let mut guards = lock_all(&cells, deadline)?;

        let occurred_at = Utc::now();
        let mut entries = Vec::new();
        let mut planned = Vec::new();
        for (idx, (key, _)) in cells.iter().enumerate() {
            let Some(receipt) = receipts.iter().find(|r| r.variant_id == key.variant_id) else {
                continue;
            };
            let on_hand = guards[idx].on_hand;
            entries.push(self.entry(
                tenant_id,
                *key,
                RefType::TransferIn,
                transfer_id.0,
                receipt.qty,
                on_hand + receipt.qty,
                occurred_at,
                actor_id,
            ));
            planned.push((idx, receipt.qty));
        }

        self.append(entries)?;
        for (idx, qty) in planned {
            guards[idx].on_hand += qty;
        }
        for receipt in receipts {
            transfer.record_receipt(receipt.variant_id, receipt.qty)?;
        }

        let complete = transfer.status() == TransferStatus::Received;
        debug!(tenant = %tenant_id, transfer = %transfer_id, complete, "transfer received");
        self.publish(
            tenant_id,
            DomainEvent::TransferReceived(TransferReceived {
                tenant_id,
                transfer_id,
                from_store_id: transfer.from_store_id(),
                to_store_id: to,
                lines: receipts
                    .iter()
                    .map(|r| TransferLineDelta {
                        variant_id: r.variant_id,
                        qty: r.qty,
                    })
                    .collect(),
                complete,
                occurred_at,
            }),
        )?;
        Ok(transfer.clone())
    }

    /// Cancel a transfer. In-transit quantities are restocked onto the
    /// source store inside the same transaction; after any receipt the
    /// cancel is rejected.
    pub fn transfer_cancel(
        &self,
        tenant_id: TenantId,
        transfer_id: TransferId,
        actor_id: ActorId,
    ) -> EngineResult<Transfer> {
        let deadline = self.deadline();
        let cell = self
            .transfers
            .cell(&transfer_id)
            .ok_or_else(EngineError::not_found)?;
        let mut transfer = lock_entity(cell.as_ref(), deadline)?;
        if transfer.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }

        match transfer.status() {
            TransferStatus::Draft | TransferStatus::InTransit => {}
            _ => {
                return Err(EngineError::invalid_transition(
                    "only draft or in-transit transfers can be cancelled",
                ));
            }
        }

        let occurred_at = Utc::now();
        let from = transfer.from_store_id();
        let cells = self.state.cells_for(
            tenant_id,
            transfer
                .lines()
                .iter()
                .filter(|l| l.qty_remaining() > 0)
                .map(|l| StockKey::new(from, l.variant_id)),
        );
        let mut guards = lock_all(&cells, deadline)?;

        let mut restocked = Vec::new();
        let mut entries = Vec::new();
        let mut planned = Vec::new();
        for (idx, (key, _)) in cells.iter().enumerate() {
            let Some(line) = transfer.line(key.variant_id) else {
                continue;
            };
            let back = line.qty_remaining();
            entries.push(self.entry(
                tenant_id,
                *key,
                RefType::Adjustment,
                transfer_id.0,
                back,
                guards[idx].on_hand + back,
                occurred_at,
                actor_id,
            ));
            restocked.push(TransferLineDelta {
                variant_id: key.variant_id,
                qty: back,
            });
            planned.push((idx, back));
        }

        self.append(entries)?;
        for (idx, qty) in planned {
            guards[idx].on_hand += qty;
        }
        transfer.cancel()?;

        debug!(tenant = %tenant_id, transfer = %transfer_id, restocked = restocked.len(), "transfer cancelled");
        self.publish(
            tenant_id,
            DomainEvent::TransferCancelled(TransferCancelled {
                tenant_id,
                transfer_id,
                from_store_id: transfer.from_store_id(),
                to_store_id: transfer.to_store_id(),
                restocked,
                occurred_at,
            }),
        )?;
        Ok(transfer.clone())
    }

    // ---- count sessions ----------------------------------------------

    /// Open a count session. At most one non-terminal full-store session
    /// may exist per store; zone sessions may overlap anything.
    pub fn create_count_session(
        &self,
        tenant_id: TenantId,
        store_id: StoreId,
        scope: CountScope,
        zone_name: Option<String>,
    ) -> EngineResult<CountSessionId> {
        let id = CountSessionId::new(EntityId::new());
        let session = CountSession::new(id, tenant_id, store_id, scope, zone_name, Utc::now())?;

        if scope == CountScope::FullStore {
            // Check and insert under one map lock so two concurrent
            // full-store creations cannot both pass the check.
            self.counts.insert_guarded(id, session, |items| {
                for cell in items.values() {
                    let existing = cell.lock();
                    if existing.tenant_id() == tenant_id
                        && existing.store_id() == store_id
                        && existing.is_open_full_store()
                    {
                        return Err(EngineError::OverlappingFullStoreCount);
                    }
                }
                Ok(())
            })?;
        } else {
            self.counts.insert(id, session);
        }
        debug!(tenant = %tenant_id, session = %id, ?scope, "count session created");
        Ok(id)
    }

    pub fn get_count_session(
        &self,
        tenant_id: TenantId,
        session_id: CountSessionId,
    ) -> EngineResult<CountSession> {
        let cell = self
            .counts
            .cell(&session_id)
            .ok_or_else(EngineError::not_found)?;
        let session = lock_entity(cell.as_ref(), self.deadline())?;
        if session.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        Ok(session.clone())
    }

    /// Record a scan. On the line's first scan the expected quantity is
    /// snapshotted from live on-hand and frozen; re-scans only move the
    /// counted quantity.
    pub fn record_count_scan(
        &self,
        tenant_id: TenantId,
        session_id: CountSessionId,
        variant_id: VariantId,
        counted_qty: i64,
    ) -> EngineResult<()> {
        let deadline = self.deadline();
        let cell = self
            .counts
            .cell(&session_id)
            .ok_or_else(EngineError::not_found)?;
        let mut session = lock_entity(cell.as_ref(), deadline)?;
        if session.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        if session.is_terminal() {
            return Err(EngineError::invalid_transition(
                "cannot scan into a finalized count session",
            ));
        }

        let expected = if session.line(variant_id).is_none() {
            let key = StockKey::new(session.store_id(), variant_id);
            let stock = self.state.cell(tenant_id, key);
            let guard = lock_entity(stock.as_ref(), deadline)?;
            guard.on_hand
        } else {
            // Frozen on first scan; value is ignored by record_scan.
            0
        };
        session.record_scan(variant_id, counted_qty, expected)
    }

    /// Per-line `counted - expected`, read-only.
    pub fn count_variance(
        &self,
        tenant_id: TenantId,
        session_id: CountSessionId,
    ) -> EngineResult<Vec<CountVariance>> {
        Ok(self.get_count_session(tenant_id, session_id)?.variance())
    }

    /// Commit the session's deltas and finalize it. Finalizing twice fails
    /// with `InvalidTransition` rather than double-applying.
    pub fn count_finalize(
        &self,
        tenant_id: TenantId,
        session_id: CountSessionId,
        actor_id: ActorId,
    ) -> EngineResult<CountSession> {
        let deadline = self.deadline();
        let cell = self
            .counts
            .cell(&session_id)
            .ok_or_else(EngineError::not_found)?;
        let mut session = lock_entity(cell.as_ref(), deadline)?;
        if session.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        if session.is_terminal() {
            return Err(EngineError::invalid_transition(
                "count session is already finalized",
            ));
        }

        let store_id = session.store_id();
        let cells = self.state.cells_for(
            tenant_id,
            session
                .lines()
                .iter()
                .map(|l| StockKey::new(store_id, l.variant_id)),
        );
        let mut guards = lock_all(&cells, deadline)?;

        let occurred_at = Utc::now();
        let mut entries = Vec::new();
        let mut planned = Vec::new();
        for (idx, (key, _)) in cells.iter().enumerate() {
            let Some(line) = session.line(key.variant_id) else {
                continue;
            };
            // Reconcile against live on-hand: the replay invariant (sum of
            // deltas == on_hand) is absolute even if stock moved between
            // first scan and finalize. Variance reporting keeps using the
            // frozen expectation.
            let delta = line.counted_qty - guards[idx].on_hand;
            if delta == 0 {
                continue;
            }
            entries.push(self.entry(
                tenant_id,
                *key,
                RefType::CountReconcile,
                session_id.0,
                delta,
                line.counted_qty,
                occurred_at,
                actor_id,
            ));
            planned.push((idx, line.counted_qty));
        }

        self.append(entries)?;
        for (idx, counted) in planned {
            guards[idx].on_hand = counted;
        }
        session.mark_finalized()?;

        debug!(tenant = %tenant_id, session = %session_id, "count session finalized");
        self.publish(
            tenant_id,
            DomainEvent::CountFinalized(CountFinalized {
                tenant_id,
                session_id,
                store_id,
                variances: session.variance(),
                occurred_at,
            }),
        )?;
        Ok(session.clone())
    }

    // ---- purchase orders ---------------------------------------------

    pub fn create_purchase_order(
        &self,
        tenant_id: TenantId,
        vendor_id: VendorId,
        store_id: StoreId,
    ) -> EngineResult<PurchaseOrderId> {
        let id = PurchaseOrderId::new(EntityId::new());
        let order = PurchaseOrder::new(id, tenant_id, vendor_id, store_id, Utc::now());
        self.purchase_orders.insert(id, order);
        debug!(tenant = %tenant_id, purchase_order = %id, "purchase order created");
        Ok(id)
    }

    pub fn add_po_line(
        &self,
        tenant_id: TenantId,
        po_id: PurchaseOrderId,
        variant_id: VariantId,
        qty_ordered: i64,
    ) -> EngineResult<()> {
        let cell = self
            .purchase_orders
            .cell(&po_id)
            .ok_or_else(EngineError::not_found)?;
        let mut order = lock_entity(cell.as_ref(), self.deadline())?;
        if order.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        order.add_line(variant_id, qty_ordered)
    }

    pub fn update_po_line(
        &self,
        tenant_id: TenantId,
        po_id: PurchaseOrderId,
        variant_id: VariantId,
        qty_ordered: i64,
    ) -> EngineResult<()> {
        let cell = self
            .purchase_orders
            .cell(&po_id)
            .ok_or_else(EngineError::not_found)?;
        let mut order = lock_entity(cell.as_ref(), self.deadline())?;
        if order.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        order.set_line_qty(variant_id, qty_ordered)
    }

    pub fn get_purchase_order(
        &self,
        tenant_id: TenantId,
        po_id: PurchaseOrderId,
    ) -> EngineResult<PurchaseOrder> {
        let cell = self
            .purchase_orders
            .cell(&po_id)
            .ok_or_else(EngineError::not_found)?;
        let order = lock_entity(cell.as_ref(), self.deadline())?;
        if order.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        Ok(order.clone())
    }

    /// Draft -> Submitted: lines freeze for vendor communication.
    pub fn po_submit(
        &self,
        tenant_id: TenantId,
        po_id: PurchaseOrderId,
    ) -> EngineResult<PurchaseOrder> {
        let cell = self
            .purchase_orders
            .cell(&po_id)
            .ok_or_else(EngineError::not_found)?;
        let mut order = lock_entity(cell.as_ref(), self.deadline())?;
        if order.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        order.submit()?;
        debug!(tenant = %tenant_id, purchase_order = %po_id, "purchase order submitted");
        Ok(order.clone())
    }

    /// Receive quantities into the order's store, possibly partially.
    pub fn po_receive(
        &self,
        tenant_id: TenantId,
        po_id: PurchaseOrderId,
        receipts: &[ReceiptLine],
        actor_id: ActorId,
    ) -> EngineResult<PurchaseOrder> {
        if receipts.is_empty() {
            return Err(EngineError::validation("receive requires at least one line"));
        }
        let deadline = self.deadline();
        let cell = self
            .purchase_orders
            .cell(&po_id)
            .ok_or_else(EngineError::not_found)?;
        let mut order = lock_entity(cell.as_ref(), deadline)?;
        if order.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        if !matches!(
            order.status(),
            PurchaseOrderStatus::Submitted | PurchaseOrderStatus::PartialReceived
        ) {
            return Err(EngineError::invalid_transition(
                "purchase order is not receivable in its current status",
            ));
        }
        for (i, receipt) in receipts.iter().enumerate() {
            if receipt.qty <= 0 {
                return Err(EngineError::validation("receive quantity must be positive"));
            }
            if receipts[..i].iter().any(|r| r.variant_id == receipt.variant_id) {
                return Err(EngineError::validation(
                    "duplicate variant in receive lines",
                ));
            }
            let line = order.line(receipt.variant_id).ok_or_else(|| {
                EngineError::validation("purchase order has no line for this variant")
            })?;
            if receipt.qty > line.qty_outstanding() {
                return Err(EngineError::validation(format!(
                    "receive quantity {} exceeds outstanding {}",
                    receipt.qty,
                    line.qty_outstanding()
                )));
            }
        }

        let store_id = order.store_id();
        let cells = self.state.cells_for(
            tenant_id,
            receipts
                .iter()
                .map(|r| StockKey::new(store_id, r.variant_id)),
        );
        let mut guards = lock_all(&cells, deadline)?;

        let occurred_at = Utc::now();
        let mut entries = Vec::new();
        let mut planned = Vec::new();
        for (idx, (key, _)) in cells.iter().enumerate() {
            let Some(receipt) = receipts.iter().find(|r| r.variant_id == key.variant_id) else {
                continue;
            };
            let on_hand = guards[idx].on_hand;
            entries.push(self.entry(
                tenant_id,
                *key,
                RefType::PurchaseOrderReceipt,
                po_id.0,
                receipt.qty,
                on_hand + receipt.qty,
                occurred_at,
                actor_id,
            ));
            planned.push((idx, receipt.qty));
        }

        self.append(entries)?;
        for (idx, qty) in planned {
            guards[idx].on_hand += qty;
        }
        for receipt in receipts {
            order.record_receipt(receipt.variant_id, receipt.qty)?;
        }

        let complete = order.status() == PurchaseOrderStatus::Received;
        debug!(tenant = %tenant_id, purchase_order = %po_id, complete, "purchase order received");
        self.publish(
            tenant_id,
            DomainEvent::PurchaseOrderReceived(PurchaseOrderReceived {
                tenant_id,
                purchase_order_id: po_id,
                store_id,
                receipts: receipts.to_vec(),
                complete,
                occurred_at,
            }),
        )?;
        Ok(order.clone())
    }

    pub fn po_cancel(
        &self,
        tenant_id: TenantId,
        po_id: PurchaseOrderId,
    ) -> EngineResult<PurchaseOrder> {
        let cell = self
            .purchase_orders
            .cell(&po_id)
            .ok_or_else(EngineError::not_found)?;
        let mut order = lock_entity(cell.as_ref(), self.deadline())?;
        if order.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        order.cancel()?;
        debug!(tenant = %tenant_id, purchase_order = %po_id, "purchase order cancelled");
        Ok(order.clone())
    }

    // ---- reservations -------------------------------------------------

    /// Hold `qty` against a stock position. Channels must reserve and then
    /// commit (or release); nothing else may deduct reservation-sourced
    /// stock.
    pub fn reserve(
        &self,
        tenant_id: TenantId,
        store_id: StoreId,
        variant_id: VariantId,
        qty: i64,
        ref_type: RefType,
        ref_id: EntityId,
    ) -> EngineResult<ReservationId> {
        let reservation_id = ReservationId::new(EntityId::new());
        let reservation = Reservation::new(
            reservation_id,
            tenant_id,
            store_id,
            variant_id,
            qty,
            ref_type,
            ref_id,
            Utc::now(),
        )?;

        let policy = self.policies.get(tenant_id);
        let key = StockKey::new(store_id, variant_id);
        let cell = self.state.cell(tenant_id, key);
        let mut guard = lock_entity(cell.as_ref(), self.deadline())?;

        let available = guard.available();
        if !policy.allow_backorders && available < qty {
            return Err(EngineError::insufficient_stock(qty, available));
        }

        guard.reserved += qty;
        let occurred_at = reservation.created_at();
        self.reservations.insert(reservation_id, reservation);

        debug!(tenant = %tenant_id, key = %key, qty, reservation = %reservation_id, "stock reserved");
        self.publish(
            tenant_id,
            DomainEvent::ReservationHeld(ReservationHeld {
                tenant_id,
                reservation_id,
                store_id,
                variant_id,
                qty,
                ref_type,
                ref_id,
                occurred_at,
            }),
        )?;
        Ok(reservation_id)
    }

    pub fn get_reservation(
        &self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
    ) -> EngineResult<Reservation> {
        let cell = self
            .reservations
            .cell(&reservation_id)
            .ok_or_else(EngineError::not_found)?;
        let reservation = lock_entity(cell.as_ref(), self.deadline())?;
        if reservation.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        Ok(reservation.clone())
    }

    /// Turn a held reservation into a final deduction. The ledger entry is
    /// written under the reservation's business purpose (e.g. a checkout
    /// hold commits as a sale against its order).
    pub fn commit_reservation(
        &self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
        actor_id: ActorId,
    ) -> EngineResult<StockSnapshot> {
        let deadline = self.deadline();
        let cell = self
            .reservations
            .cell(&reservation_id)
            .ok_or_else(EngineError::not_found)?;
        let mut reservation = lock_entity(cell.as_ref(), deadline)?;
        if reservation.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        if !reservation.is_held() {
            return Err(EngineError::invalid_transition(
                "only held reservations can be committed",
            ));
        }

        let qty = reservation.qty();
        let key = StockKey::new(reservation.store_id(), reservation.variant_id());
        let stock = self.state.cell(tenant_id, key);
        let mut guard = lock_entity(stock.as_ref(), deadline)?;

        let occurred_at = Utc::now();
        let old_on_hand = guard.on_hand;
        let new_on_hand = old_on_hand - qty;
        self.append(vec![self.entry(
            tenant_id,
            key,
            reservation.ref_type(),
            reservation.ref_id(),
            -qty,
            new_on_hand,
            occurred_at,
            actor_id,
        )])?;
        guard.on_hand = new_on_hand;
        guard.reserved -= qty;
        reservation.mark_committed()?;

        debug!(tenant = %tenant_id, key = %key, qty, reservation = %reservation_id, "reservation committed");
        self.publish(
            tenant_id,
            DomainEvent::ReservationCommitted(ReservationCommitted {
                tenant_id,
                reservation_id,
                store_id: key.store_id,
                variant_id: key.variant_id,
                qty,
                ref_type: reservation.ref_type(),
                ref_id: reservation.ref_id(),
                occurred_at,
            }),
        )?;
        Ok(StockSnapshot::of(key, &guard))
    }

    /// Give a held quantity back to available. On-hand is untouched; the
    /// release is still ledgered (delta 0) for the audit trail.
    pub fn release_reservation(
        &self,
        tenant_id: TenantId,
        reservation_id: ReservationId,
        actor_id: ActorId,
    ) -> EngineResult<StockSnapshot> {
        let deadline = self.deadline();
        let cell = self
            .reservations
            .cell(&reservation_id)
            .ok_or_else(EngineError::not_found)?;
        let mut reservation = lock_entity(cell.as_ref(), deadline)?;
        if reservation.tenant_id() != tenant_id {
            return Err(EngineError::not_found());
        }
        if !reservation.is_held() {
            return Err(EngineError::invalid_transition(
                "only held reservations can be released",
            ));
        }

        let qty = reservation.qty();
        let key = StockKey::new(reservation.store_id(), reservation.variant_id());
        let stock = self.state.cell(tenant_id, key);
        let mut guard = lock_entity(stock.as_ref(), deadline)?;

        let occurred_at = Utc::now();
        self.append(vec![self.entry(
            tenant_id,
            key,
            RefType::ReservationRelease,
            reservation_id.0,
            0,
            guard.on_hand,
            occurred_at,
            actor_id,
        )])?;
        guard.reserved -= qty;
        reservation.mark_released()?;

        debug!(tenant = %tenant_id, key = %key, qty, reservation = %reservation_id, "reservation released");
        self.publish(
            tenant_id,
            DomainEvent::ReservationReleased(ReservationReleased {
                tenant_id,
                reservation_id,
                store_id: key.store_id,
                variant_id: key.variant_id,
                qty,
                occurred_at,
            }),
        )?;
        Ok(StockSnapshot::of(key, &guard))
    }
}
