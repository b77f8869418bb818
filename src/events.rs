// src/events.rs

//! Ordered fan-out of executor notifications.
//!
//! Every subscriber gets its own unbounded queue, so a slow listener never
//! loses events and never stalls the executor. Events reach each listener in
//! the order they were emitted; listeners registered later only see later
//! events. Dropped receivers are pruned on the next emit.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct EventBus<E> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<E>>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// The lock is held for the whole fan-out so that concurrent emitters
    /// cannot interleave differently for different listeners.
    pub fn emit(&self, event: E) {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }
}
