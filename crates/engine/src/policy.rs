//! Tenant policy lookup.

use std::collections::HashMap;

use parking_lot::RwLock;

use stockline_core::{TenantId, TenantPolicy};

/// In-memory tenant policy store.
///
/// Tenants without an explicit entry get the strict default (no
/// backorders). Policy reads happen inside engine transactions, so the map
/// lock is only ever held for a copy.
#[derive(Debug, Default)]
pub struct PolicyStore {
    policies: RwLock<HashMap<TenantId, TenantPolicy>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tenant_id: TenantId, policy: TenantPolicy) {
        self.policies.write().insert(tenant_id, policy);
    }

    pub fn get(&self, tenant_id: TenantId) -> TenantPolicy {
        self.policies
            .read()
            .get(&tenant_id)
            .copied()
            .unwrap_or_default()
    }
}
