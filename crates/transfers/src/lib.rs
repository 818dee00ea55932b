//! Transfer workflow domain module.
//!
//! This crate contains business rules for store-to-store transfers,
//! implemented purely as deterministic domain logic (no IO, no locking, no
//! storage). Stock quantities are never touched here: the movement engine
//! owns those and calls into this state machine at transition points.

pub mod transfer;

pub use transfer::{Transfer, TransferId, TransferLine, TransferStatus};
