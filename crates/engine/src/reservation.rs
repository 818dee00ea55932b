use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{EngineError, EngineResult, Entity, EntityId, StoreId, TenantId, VariantId};
use stockline_ledger::RefType;

/// Reservation identifier (tenant-scoped via the `tenant_id` field on the entity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub EntityId);

impl ReservationId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Reservation status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Held,
    Committed,
    Released,
}

/// A hold of quantity against one stock position.
///
/// While Held, the item's `reserved` includes `qty` exactly once; committed
/// or released reservations no longer contribute. `ref_type`/`ref_id`
/// record the business purpose of the hold (e.g. a POS checkout reserving
/// for a sale); committing writes the ledger entry under that purpose tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    tenant_id: TenantId,
    store_id: StoreId,
    variant_id: VariantId,
    qty: i64,
    ref_type: RefType,
    ref_id: EntityId,
    status: ReservationStatus,
    created_at: DateTime<Utc>,
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Reservation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ReservationId,
        tenant_id: TenantId,
        store_id: StoreId,
        variant_id: VariantId,
        qty: i64,
        ref_type: RefType,
        ref_id: EntityId,
        created_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        if qty <= 0 {
            return Err(EngineError::validation("reservation quantity must be positive"));
        }
        Ok(Self {
            id,
            tenant_id,
            store_id,
            variant_id,
            qty,
            ref_type,
            ref_id,
            status: ReservationStatus::Held,
            created_at,
        })
    }

    pub fn id_typed(&self) -> ReservationId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn qty(&self) -> i64 {
        self.qty
    }

    pub fn ref_type(&self) -> RefType {
        self.ref_type
    }

    pub fn ref_id(&self) -> EntityId {
        self.ref_id
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_held(&self) -> bool {
        self.status == ReservationStatus::Held
    }

    /// Held -> Committed. The engine deducts on_hand and reserved in the
    /// same transaction.
    pub fn mark_committed(&mut self) -> EngineResult<()> {
        if !self.is_held() {
            return Err(EngineError::invalid_transition(
                "only held reservations can be committed",
            ));
        }
        self.status = ReservationStatus::Committed;
        Ok(())
    }

    /// Held -> Released. The engine gives the quantity back to available.
    pub fn mark_released(&mut self) -> EngineResult<()> {
        if !self.is_held() {
            return Err(EngineError::invalid_transition(
                "only held reservations can be released",
            ));
        }
        self.status = ReservationStatus::Released;
        Ok(())
    }
}
