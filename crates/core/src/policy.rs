//! Tenant-level stock policy.

use serde::{Deserialize, Serialize};

/// Per-tenant knobs that change stock semantics.
///
/// `allow_backorders` gates whether reservations and sales may push
/// `available` (and thus `on_hand`) negative, tracked as a negative balance
/// until replenished. The default is the strict mode: quantities never go
/// below zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantPolicy {
    #[serde(default)]
    pub allow_backorders: bool,
}

impl Default for TenantPolicy {
    fn default() -> Self {
        Self {
            allow_backorders: false,
        }
    }
}

impl TenantPolicy {
    pub fn with_backorders() -> Self {
        Self {
            allow_backorders: true,
        }
    }
}
