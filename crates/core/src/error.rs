//! Engine error taxonomy.

use thiserror::Error;

/// Result type used across the engine and workflow layers.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by stock operations.
///
/// Every variant is raised **before** the first state mutation of a
/// transaction: a failed operation leaves inventory state, the ledger, and
/// workflow objects untouched, so no compensating transactions exist.
/// The single exception is [`EngineError::Publish`], raised after a commit
/// when event publication fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Requested quantity exceeds available stock and the tenant does not
    /// allow backorders. Callers may retry with a smaller quantity.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Tenant policy forbids driving available stock negative.
    #[error("backorders are not allowed for this tenant")]
    BackorderNotAllowed,

    /// A non-terminal full-store count session already exists for the store.
    #[error("a full-store count session is already open for this store")]
    OverlappingFullStoreCount,

    /// Attempted workflow transition is not legal from the current status.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A stock or workflow lock could not be acquired within the configured
    /// timeout. Nothing was applied; safe to retry with backoff.
    #[error("lock acquisition timed out")]
    LockTimeout,

    /// A value failed validation (e.g. non-positive quantity, malformed id).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested entity was not found (or belongs to another tenant).
    #[error("not found")]
    NotFound,

    /// The ledger rejected an append. Raised before any state mutation.
    #[error("ledger append failed: {0}")]
    Ledger(String),

    /// Event publication failed after the transaction committed. State and
    /// ledger are already durable; the ledger remains the source of truth.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn insufficient_stock(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Whether the caller may safely retry the operation as-is.
    ///
    /// Only lock contention qualifies: a timed-out acquisition never
    /// partially applied anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout)
    }
}
