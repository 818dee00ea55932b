//! In-memory workflow entity store.
//!
//! Each entity lives behind its own mutex, so a cancel and an in-flight
//! receive on the same transfer serialize on the same lock while
//! transitions on unrelated entities proceed concurrently. The outer map
//! lock is held only to fetch or insert handles — never across a cell or
//! stock acquisition — with one exception: `insert_guarded` runs its check
//! under the map write lock so that check-then-insert invariants (the
//! full-store count overlap rule) cannot race. Guarded checks may lock
//! entity cells but must never touch stock locks.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use stockline_core::EngineResult;

#[derive(Debug)]
pub struct Directory<K, T> {
    items: RwLock<HashMap<K, Arc<Mutex<T>>>>,
}

impl<K, T> Default for Directory<K, T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, T> Directory<K, T>
where
    K: Eq + Hash + Copy,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: K, value: T) -> Arc<Mutex<T>> {
        let cell = Arc::new(Mutex::new(value));
        self.items.write().insert(id, Arc::clone(&cell));
        cell
    }

    /// Insert after `check` passes, atomically with respect to other
    /// guarded inserts. `check` sees every existing cell and may lock them
    /// briefly; it must not acquire stock locks.
    pub fn insert_guarded(
        &self,
        id: K,
        value: T,
        check: impl FnOnce(&HashMap<K, Arc<Mutex<T>>>) -> EngineResult<()>,
    ) -> EngineResult<Arc<Mutex<T>>> {
        let mut items = self.items.write();
        check(&items)?;
        let cell = Arc::new(Mutex::new(value));
        items.insert(id, Arc::clone(&cell));
        Ok(cell)
    }

    /// Handle for one entity's cell, if present.
    pub fn cell(&self, id: &K) -> Option<Arc<Mutex<T>>> {
        self.items.read().get(id).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}
