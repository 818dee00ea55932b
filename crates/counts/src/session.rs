use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockline_core::{EngineError, EngineResult, Entity, EntityId, StoreId, TenantId, VariantId};

/// Count session identifier (tenant-scoped via the `tenant_id` field on the entity).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountSessionId(pub EntityId);

impl CountSessionId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CountSessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Coverage of a count session: the whole store or one named zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountScope {
    FullStore,
    Zone,
}

/// Count session status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountStatus {
    Draft,
    InProgress,
    Finalized,
}

/// One counted variant.
///
/// `expected_qty` is snapshotted from live on-hand at the *first scan* of
/// the line and frozen thereafter; re-scans only move `counted_qty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLine {
    pub variant_id: VariantId,
    pub expected_qty: i64,
    pub counted_qty: i64,
}

/// Read-only variance for one line: what the count says vs. what was
/// expected when counting started on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountVariance {
    pub variant_id: VariantId,
    pub expected_qty: i64,
    pub counted_qty: i64,
    pub variance: i64,
}

/// Cycle count session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSession {
    id: CountSessionId,
    tenant_id: TenantId,
    store_id: StoreId,
    scope: CountScope,
    zone_name: Option<String>,
    status: CountStatus,
    lines: Vec<CountLine>,
    created_at: DateTime<Utc>,
}

impl Entity for CountSession {
    type Id = CountSessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl CountSession {
    pub fn new(
        id: CountSessionId,
        tenant_id: TenantId,
        store_id: StoreId,
        scope: CountScope,
        zone_name: Option<String>,
        created_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        match (scope, &zone_name) {
            (CountScope::Zone, None) => {
                return Err(EngineError::validation(
                    "zone count sessions require a zone name",
                ));
            }
            (CountScope::Zone, Some(name)) if name.trim().is_empty() => {
                return Err(EngineError::validation("zone name cannot be empty"));
            }
            (CountScope::FullStore, Some(_)) => {
                return Err(EngineError::validation(
                    "full-store count sessions do not take a zone name",
                ));
            }
            _ => {}
        }
        Ok(Self {
            id,
            tenant_id,
            store_id,
            scope,
            zone_name,
            status: CountStatus::Draft,
            lines: Vec::new(),
            created_at,
        })
    }

    pub fn id_typed(&self) -> CountSessionId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn scope(&self) -> CountScope {
        self.scope
    }

    pub fn zone_name(&self) -> Option<&str> {
        self.zone_name.as_deref()
    }

    pub fn status(&self) -> CountStatus {
        self.status
    }

    pub fn lines(&self) -> &[CountLine] {
        &self.lines
    }

    pub fn line(&self, variant_id: VariantId) -> Option<&CountLine> {
        self.lines.iter().find(|l| l.variant_id == variant_id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status == CountStatus::Finalized
    }

    /// True for the sessions that block a new FullStore session on the store.
    pub fn is_open_full_store(&self) -> bool {
        self.scope == CountScope::FullStore && !self.is_terminal()
    }

    /// Record a scan of one variant.
    ///
    /// `expected_snapshot` is the store's live on-hand at scan time; it is
    /// captured only on the line's first scan. A session opened long before
    /// any scanning therefore reflects accurate point-in-time expectations.
    pub fn record_scan(
        &mut self,
        variant_id: VariantId,
        counted_qty: i64,
        expected_snapshot: i64,
    ) -> EngineResult<()> {
        if self.status == CountStatus::Finalized {
            return Err(EngineError::invalid_transition(
                "cannot scan into a finalized count session",
            ));
        }
        if counted_qty < 0 {
            return Err(EngineError::validation("counted quantity cannot be negative"));
        }
        match self.lines.iter_mut().find(|l| l.variant_id == variant_id) {
            Some(line) => {
                // Re-scan: expected stays frozen.
                line.counted_qty = counted_qty;
            }
            None => self.lines.push(CountLine {
                variant_id,
                expected_qty: expected_snapshot,
                counted_qty,
            }),
        }
        self.status = CountStatus::InProgress;
        Ok(())
    }

    /// Per-line `counted - expected`, without mutating anything.
    pub fn variance(&self) -> Vec<CountVariance> {
        self.lines
            .iter()
            .map(|l| CountVariance {
                variant_id: l.variant_id,
                expected_qty: l.expected_qty,
                counted_qty: l.counted_qty,
                variance: l.counted_qty - l.expected_qty,
            })
            .collect()
    }

    /// Close the session. Finalizing twice is rejected rather than
    /// double-applying deltas.
    pub fn mark_finalized(&mut self) -> EngineResult<()> {
        if self.status == CountStatus::Finalized {
            return Err(EngineError::invalid_transition(
                "count session is already finalized",
            ));
        }
        self.status = CountStatus::Finalized;
        Ok(())
    }
}
