//! Engine configuration.

use std::time::Duration;

/// Tuning knobs for the movement engine.
///
/// `lock_timeout` bounds every lock acquisition (stock cells and workflow
/// entities). An operation that cannot take all of its locks inside the
/// budget fails with `LockTimeout` having applied nothing, so callers can
/// retry with backoff instead of blocking indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub lock_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self { lock_timeout }
    }
}
