//! In-memory publisher for tests/dev.

use std::sync::mpsc;

use parking_lot::Mutex;

use crate::publisher::{EventPublisher, Subscription};

/// In-memory broadcast publisher.
///
/// - No IO / no async
/// - Best-effort fan-out to all live subscriptions
/// - Dead subscribers are dropped during publish
#[derive(Debug)]
pub struct InMemoryPublisher<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryPublisher<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        Subscription::new(rx)
    }
}

impl<M> Default for InMemoryPublisher<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventPublisher<M> for InMemoryPublisher<M>
where
    M: Clone + Send + 'static,
{
    type Error = core::convert::Infallible;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock();

        // Drop any dead subscribers while publishing.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }
}
