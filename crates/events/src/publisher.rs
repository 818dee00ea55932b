//! Event publication seam (mechanics only).
//!
//! The engine calls [`EventPublisher::publish`] synchronously inside the
//! same transaction boundary as the state mutation and ledger append, so
//! emission is tied to commit success: exactly one publish per committed
//! transaction, in per-key commit order. What happens after publication
//! (webhook delivery, signing, retry/backoff) belongs to external
//! subscribers; a publisher implementation is only a hand-off point.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to a published event stream.
///
/// Subscriptions are handed out by in-process publisher implementations
/// (broadcast semantics: each subscription gets a copy of every message).
/// Designed for single-threaded consumption; use one subscription per
/// consumer thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Synchronous publication contract the engine commits through.
///
/// Implementations must be cheap and non-blocking in spirit: the engine
/// holds stock locks while publishing, so a publisher that performs slow IO
/// directly (instead of queueing) will serialize unrelated operations.
pub trait EventPublisher<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;
}

impl<M, P> EventPublisher<M> for Arc<P>
where
    P: EventPublisher<M> + ?Sized,
{
    type Error = P::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }
}
