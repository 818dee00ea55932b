use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{EngineError, EngineResult, Entity, EntityId, StoreId, TenantId, VariantId};

/// Transfer identifier (tenant-scoped via the `tenant_id` field on the entity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub EntityId);

impl TransferId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Transfer status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Draft,
    InTransit,
    PartialReceived,
    Received,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Received | TransferStatus::Cancelled)
    }
}

/// One variant moving on a transfer.
///
/// `qty_sent`/`qty_received` default to zero so rows serialized before
/// these fields existed keep their original meaning. Invariant at all
/// times: `0 <= qty_received <= qty_sent <= qty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub variant_id: VariantId,
    pub qty: i64,
    #[serde(default)]
    pub qty_sent: i64,
    #[serde(default)]
    pub qty_received: i64,
}

impl TransferLine {
    /// Sent but not yet received. Derived for display; never stored.
    pub fn qty_remaining(&self) -> i64 {
        self.qty_sent - self.qty_received
    }

    /// Not yet deducted from the source store.
    pub fn qty_unsent(&self) -> i64 {
        self.qty - self.qty_sent
    }
}

/// Store-to-store transfer.
///
/// Owns its lifecycle status and lines. The movement engine mutates stock
/// and drives transitions; this type only validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    id: TransferId,
    tenant_id: TenantId,
    from_store_id: StoreId,
    to_store_id: StoreId,
    status: TransferStatus,
    lines: Vec<TransferLine>,
    created_at: DateTime<Utc>,
}

impl Entity for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Transfer {
    pub fn new(
        id: TransferId,
        tenant_id: TenantId,
        from_store_id: StoreId,
        to_store_id: StoreId,
        created_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        if from_store_id == to_store_id {
            return Err(EngineError::validation(
                "transfer source and destination stores must differ",
            ));
        }
        Ok(Self {
            id,
            tenant_id,
            from_store_id,
            to_store_id,
            status: TransferStatus::Draft,
            lines: Vec::new(),
            created_at,
        })
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn from_store_id(&self) -> StoreId {
        self.from_store_id
    }

    pub fn to_store_id(&self) -> StoreId {
        self.to_store_id
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn lines(&self) -> &[TransferLine] {
        &self.lines
    }

    pub fn line(&self, variant_id: VariantId) -> Option<&TransferLine> {
        self.lines.iter().find(|l| l.variant_id == variant_id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Add a line (only allowed in Draft).
    pub fn add_line(&mut self, variant_id: VariantId, qty: i64) -> EngineResult<()> {
        if self.status != TransferStatus::Draft {
            return Err(EngineError::invalid_transition(
                "cannot modify transfer lines once sent",
            ));
        }
        if qty <= 0 {
            return Err(EngineError::validation("quantity must be positive"));
        }
        if self.line(variant_id).is_some() {
            return Err(EngineError::validation(
                "transfer already has a line for this variant",
            ));
        }
        self.lines.push(TransferLine {
            variant_id,
            qty,
            qty_sent: 0,
            qty_received: 0,
        });
        Ok(())
    }

    /// Change a draft line's quantity.
    pub fn set_line_qty(&mut self, variant_id: VariantId, qty: i64) -> EngineResult<()> {
        if self.status != TransferStatus::Draft {
            return Err(EngineError::invalid_transition(
                "cannot modify transfer lines once sent",
            ));
        }
        if qty <= 0 {
            return Err(EngineError::validation("quantity must be positive"));
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.variant_id == variant_id)
            .ok_or_else(|| EngineError::validation("transfer has no line for this variant"))?;
        line.qty = qty;
        Ok(())
    }

    /// Draft -> InTransit. Marks every line fully sent.
    ///
    /// The engine validates and deducts source stock before calling this;
    /// the whole send is rejected upstream if any line cannot be satisfied.
    pub fn mark_sent(&mut self) -> EngineResult<()> {
        if self.status != TransferStatus::Draft {
            return Err(EngineError::invalid_transition(
                "only draft transfers can be sent",
            ));
        }
        if self.lines.is_empty() {
            return Err(EngineError::validation("cannot send transfer without lines"));
        }
        for line in &mut self.lines {
            line.qty_sent = line.qty;
        }
        self.status = TransferStatus::InTransit;
        Ok(())
    }

    /// Record a (possibly partial) receipt against one line, then recompute
    /// status: Received once every line is fully received, else
    /// PartialReceived.
    pub fn record_receipt(&mut self, variant_id: VariantId, qty_receive: i64) -> EngineResult<()> {
        if !matches!(
            self.status,
            TransferStatus::InTransit | TransferStatus::PartialReceived
        ) {
            return Err(EngineError::invalid_transition(
                "transfer is not receivable in its current status",
            ));
        }
        if qty_receive <= 0 {
            return Err(EngineError::validation("receive quantity must be positive"));
        }
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.variant_id == variant_id)
            .ok_or_else(|| EngineError::validation("transfer has no line for this variant"))?;
        if qty_receive > line.qty_remaining() {
            return Err(EngineError::validation(format!(
                "receive quantity {} exceeds remaining in-transit {}",
                qty_receive,
                line.qty_remaining()
            )));
        }
        line.qty_received += qty_receive;
        self.status = self.derive_status();
        Ok(())
    }

    fn derive_status(&self) -> TransferStatus {
        if self.lines.iter().all(|l| l.qty_received == l.qty_sent) {
            TransferStatus::Received
        } else {
            TransferStatus::PartialReceived
        }
    }

    /// Cancel. Legal from Draft or InTransit only: once anything has been
    /// received, partially-received stock cannot be un-transferred.
    pub fn cancel(&mut self) -> EngineResult<()> {
        match self.status {
            TransferStatus::Draft | TransferStatus::InTransit => {
                self.status = TransferStatus::Cancelled;
                Ok(())
            }
            _ => Err(EngineError::invalid_transition(
                "only draft or in-transit transfers can be cancelled",
            )),
        }
    }
}
