//! `stockline-ledger` — append-only stock movement ledger.
//!
//! Every stock-affecting operation leaves one or more immutable
//! [`StockMovementEntry`] rows here. The ledger supports filtered queries
//! and never supports update or delete: replaying a key's entries in order
//! and summing `delta` reconstructs its current on-hand exactly.

pub mod entry;
pub mod query;
pub mod store;

pub use entry::{RefType, StockMovementEntry};
pub use query::{LedgerFilter, LedgerQueryResult, Pagination};
pub use store::{InMemoryLedgerStore, LedgerError, LedgerStore, replay_on_hand};
