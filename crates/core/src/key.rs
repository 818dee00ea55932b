//! Stock key: the unit of locking and ledger ordering.

use serde::{Deserialize, Serialize};

use crate::id::{StoreId, VariantId};

/// Identifies one stock position: a variant held at a store.
///
/// This is the granularity at which the engine locks, so the derived `Ord`
/// (store first, then variant) is load-bearing: operations touching several
/// keys acquire their locks in ascending key order to stay deadlock-free.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StockKey {
    pub store_id: StoreId,
    pub variant_id: VariantId,
}

impl StockKey {
    pub fn new(store_id: StoreId, variant_id: VariantId) -> Self {
        Self {
            store_id,
            variant_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.store_id, self.variant_id)
    }
}
