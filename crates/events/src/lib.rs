//! `stockline-events` — domain event machinery.
//!
//! The movement engine publishes one event per committed transaction,
//! synchronously, before returning success to the caller. This crate holds
//! the machinery only: the [`Event`] trait, the tenant-scoped
//! [`EventEnvelope`], the [`EventPublisher`] seam the engine calls through,
//! and an in-memory publisher for tests/dev. Concrete event payloads are
//! defined next to the code that emits them.

pub mod envelope;
pub mod event;
pub mod in_memory;
pub mod publisher;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory::InMemoryPublisher;
pub use publisher::{EventPublisher, Subscription};
