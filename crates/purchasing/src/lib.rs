//! Purchase order workflow domain module.
//!
//! This crate contains business rules for purchase orders, implemented
//! purely as deterministic domain logic (no IO, no locking, no storage).
//! Vendors appear as identity references only; receiving stock into a
//! store is the movement engine's job.

pub mod order;

pub use order::{PoLine, PurchaseOrder, PurchaseOrderId, PurchaseOrderStatus, VendorId};
