//! Cycle count workflow domain module.
//!
//! This crate contains business rules for count sessions, implemented
//! purely as deterministic domain logic (no IO, no locking, no storage).
//! Reconciling counted quantities into stock is the movement engine's job;
//! this state machine only owns the session lifecycle and its lines.

pub mod session;

pub use session::{CountLine, CountScope, CountSession, CountSessionId, CountStatus, CountVariance};
