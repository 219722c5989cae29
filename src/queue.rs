//! Cross-thread notification queue.
//!
//! Transport libraries report connects, disconnects and inbound messages from
//! their own tasks. Nothing in this crate mutates supervisor or dispatcher
//! state from those threads; every notification is pushed here and consumed by
//! the single thread driving [`run_cycle`](crate::supervisor::ConnectionSupervisor::run_cycle).

use std::collections::VecDeque;
use std::sync::Mutex;

/// Unbounded FIFO shared between producer threads and one consumer.
///
/// `drain` snapshots the queue under the lock and releases it before the
/// caller processes anything, so producers are never blocked on consumer work
/// and an event pushed mid-drain lands in the next drain, not the current one.
#[derive(Debug, Default)]
pub struct NotificationQueue<T> {
    events: Mutex<VecDeque<T>>,
}

impl<T> NotificationQueue<T> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends an event. Safe to call concurrently from any thread.
    pub fn push(&self, event: T) {
        self.lock().push_back(event);
    }

    /// Removes and returns everything queued so far, in push order.
    pub fn drain(&self) -> VecDeque<T> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A poisoned lock only means a producer panicked mid-push; the queue
    // itself is still a valid FIFO, so keep serving it.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
