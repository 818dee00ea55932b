use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{EngineError, EngineResult, Entity, EntityId, StoreId, TenantId, VariantId};

/// Purchase order identifier (tenant-scoped via the `tenant_id` field on the entity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub EntityId);

impl PurchaseOrderId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Vendor identity reference. Vendor management lives outside this system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(pub EntityId);

impl VendorId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VendorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Purchase order status lifecycle.
///
/// PartialReceived/Received derive deterministically from line totals; they
/// are never set independently of the lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Submitted,
    PartialReceived,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled
        )
    }
}

/// Purchase order line item.
///
/// `qty_received` defaults to zero so rows serialized before the field
/// existed keep their original meaning. Invariant: `qty_received <= qty_ordered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoLine {
    pub variant_id: VariantId,
    pub qty_ordered: i64,
    #[serde(default)]
    pub qty_received: i64,
}

impl PoLine {
    pub fn qty_outstanding(&self) -> i64 {
        self.qty_ordered - self.qty_received
    }
}

/// Purchase order against a vendor, receivable into one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: TenantId,
    vendor_id: VendorId,
    store_id: StoreId,
    status: PurchaseOrderStatus,
    lines: Vec<PoLine>,
    created_at: DateTime<Utc>,
}

impl Entity for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl PurchaseOrder {
    pub fn new(
        id: PurchaseOrderId,
        tenant_id: TenantId,
        vendor_id: VendorId,
        store_id: StoreId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            vendor_id,
            store_id,
            status: PurchaseOrderStatus::Draft,
            lines: Vec::new(),
            created_at,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn vendor_id(&self) -> VendorId {
        self.vendor_id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PoLine] {
        &self.lines
    }

    pub fn line(&self, variant_id: VariantId) -> Option<&PoLine> {
        self.lines.iter().find(|l| l.variant_id == variant_id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Add a line (only allowed in Draft).
    pub fn add_line(&mut self, variant_id: VariantId, qty_ordered: i64) -> EngineResult<()> {
        if self.status != PurchaseOrderStatus::Draft {
            return Err(EngineError::invalid_transition(
                "cannot modify purchase order lines once submitted",
            ));
        }
        if qty_ordered <= 0 {
            return Err(EngineError::validation("quantity must be positive"));
        }
        if self.line(variant_id).is_some() {
            return Err(EngineError::validation(
                "purchase order already has a line for this variant",
            ));
        }
        self.lines.push(PoLine {
            variant_id,
            qty_ordered,
            qty_received: 0,
        });
        Ok(())
    }

    /// Change a draft line's ordered quantity.
    pub fn set_line_qty(&mut self, variant_id: VariantId, qty_ordered: i64) -> EngineResult<()> {
        if self.status != PurchaseOrderStatus::Draft {
            return Err(EngineError::invalid_transition(
                "cannot modify purchase order lines once submitted",
            ));
        }
        if qty_ordered <= 0 {
            return Err(EngineError::validation("quantity must be positive"));
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.variant_id == variant_id)
            .ok_or_else(|| {
                EngineError::validation("purchase order has no line for this variant")
            })?;
        line.qty_ordered = qty_ordered;
        Ok(())
    }

    /// Draft -> Submitted. Lines are frozen for vendor communication but
    /// remain receivable.
    pub fn submit(&mut self) -> EngineResult<()> {
        if self.status != PurchaseOrderStatus::Draft {
            return Err(EngineError::invalid_transition(
                "only draft purchase orders can be submitted",
            ));
        }
        if self.lines.is_empty() {
            return Err(EngineError::validation(
                "cannot submit purchase order without lines",
            ));
        }
        self.status = PurchaseOrderStatus::Submitted;
        Ok(())
    }

    /// Record a (possibly partial) receipt against one line, then recompute
    /// status from line totals.
    pub fn record_receipt(&mut self, variant_id: VariantId, qty_receive: i64) -> EngineResult<()> {
        if !matches!(
            self.status,
            PurchaseOrderStatus::Submitted | PurchaseOrderStatus::PartialReceived
        ) {
            return Err(EngineError::invalid_transition(
                "purchase order is not receivable in its current status",
            ));
        }
        if qty_receive <= 0 {
            return Err(EngineError::validation("receive quantity must be positive"));
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.variant_id == variant_id)
            .ok_or_else(|| {
                EngineError::validation("purchase order has no line for this variant")
            })?;
        if qty_receive > line.qty_outstanding() {
            return Err(EngineError::validation(format!(
                "receive quantity {} exceeds outstanding {}",
                qty_receive,
                line.qty_outstanding()
            )));
        }
        line.qty_received += qty_receive;
        self.status = self.derive_status();
        Ok(())
    }

    fn derive_status(&self) -> PurchaseOrderStatus {
        if self.lines.iter().all(|l| l.qty_received == l.qty_ordered) {
            PurchaseOrderStatus::Received
        } else {
            PurchaseOrderStatus::PartialReceived
        }
    }

    /// Cancel. Allowed from Draft/Submitted only while nothing has been
    /// received.
    pub fn cancel(&mut self) -> EngineResult<()> {
        if !matches!(
            self.status,
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Submitted
        ) {
            return Err(EngineError::invalid_transition(
                "only draft or submitted purchase orders can be cancelled",
            ));
        }
        if self.lines.iter().any(|l| l.qty_received > 0) {
            return Err(EngineError::invalid_transition(
                "cannot cancel a purchase order with received lines",
            ));
        }
        self.status = PurchaseOrderStatus::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_order() -> PurchaseOrder {
        PurchaseOrder::new(
            PurchaseOrderId::new(EntityId::new()),
            TenantId::new(),
            VendorId::new(EntityId::new()),
            StoreId::new(),
            Utc::now(),
        )
    }

    #[test]
    fn submit_requires_lines() {
        let mut order = test_order();
        assert!(matches!(
            order.submit().unwrap_err(),
            EngineError::Validation(_)
        ));

        order.add_line(VariantId::new(), 10).unwrap();
        order.submit().unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Submitted);
    }

    #[test]
    fn lines_are_frozen_after_submit() {
        let mut order = test_order();
        order.add_line(VariantId::new(), 10).unwrap();
        order.submit().unwrap();

        let err = order.add_line(VariantId::new(), 5).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[test]
    fn cannot_receive_before_submission() {
        let mut order = test_order();
        let variant = VariantId::new();
        order.add_line(variant, 10).unwrap();

        let err = order.record_receipt(variant, 10).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[test]
    fn status_derives_from_line_totals() {
        let mut order = test_order();
        let bolts = VariantId::new();
        let nuts = VariantId::new();
        order.add_line(bolts, 10).unwrap();
        order.add_line(nuts, 4).unwrap();
        order.submit().unwrap();

        order.record_receipt(bolts, 10).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::PartialReceived);

        order.record_receipt(nuts, 2).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::PartialReceived);

        order.record_receipt(nuts, 2).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Received);
        assert!(order.status().is_terminal());
    }

    #[test]
    fn over_receipt_is_rejected_per_line() {
        let mut order = test_order();
        let variant = VariantId::new();
        order.add_line(variant, 10).unwrap();
        order.submit().unwrap();
        order.record_receipt(variant, 8).unwrap();

        let err = order.record_receipt(variant, 3).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(order.line(variant).unwrap().qty_received, 8);
    }

    #[test]
    fn cancel_rules() {
        // Draft: fine.
        let mut order = test_order();
        order.cancel().unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Cancelled);

        // Submitted with no receipts: fine.
        let mut order = test_order();
        let variant = VariantId::new();
        order.add_line(variant, 10).unwrap();
        order.submit().unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Cancelled);

        // Any received quantity blocks cancellation.
        let mut order = test_order();
        order.add_line(variant, 10).unwrap();
        order.submit().unwrap();
        order.record_receipt(variant, 1).unwrap();
        assert!(matches!(
            order.cancel().unwrap_err(),
            EngineError::InvalidTransition(_)
        ));
    }
}
