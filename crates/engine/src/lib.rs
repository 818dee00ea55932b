//! `stockline-engine` — the transactional movement core.
//!
//! Every stock-affecting action runs through [`MovementEngine`] as one
//! atomic operation: acquire the per-(store, variant) lock(s), validate,
//! mutate [`InventoryState`] and append ledger entries together, publish a
//! domain event, return the new snapshot. Workflow state machines
//! (transfers, counts, purchase orders, reservations) never touch
//! quantities directly; they live in [`Directory`] cells and are driven by
//! engine transitions that serialize on the same per-entity lock.

pub mod config;
pub mod directory;
pub mod engine;
pub mod events;
pub mod policy;
pub mod reservation;
pub mod state;

pub use config::EngineConfig;
pub use directory::Directory;
pub use engine::{AdjustmentKind, MovementEngine};
pub use events::{
    CountFinalized, DomainEvent, PurchaseOrderReceived, ReceiptLine, ReservationCommitted,
    ReservationHeld, ReservationReleased, StockChanged, TransferCancelled, TransferLineDelta,
    TransferReceived, TransferSent,
};
pub use policy::PolicyStore;
pub use reservation::{Reservation, ReservationId, ReservationStatus};
pub use state::{InventoryState, ItemCell, StockSnapshot};
