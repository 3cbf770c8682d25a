//! Bounded queue of newly available keys awaiting announcement.

use std::collections::VecDeque;

use parking_lot::Mutex;
use shared_types::BlockKey;
use tokio::sync::Notify;

/// Fixed-capacity FIFO. When full, new keys are rejected rather than
/// blocking the caller; the caller counts the drop.
#[derive(Debug)]
pub struct ProvideBuffer {
    queue: Mutex<VecDeque<BlockKey>>,
    capacity: usize,
    available: Notify,
}

impl ProvideBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
        }
    }

    /// Appends `key`. Returns `false` if the buffer is full.
    pub fn try_push(&self, key: BlockKey) -> bool {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                return false;
            }
            queue.push_back(key);
        }
        self.available.notify_one();
        true
    }

    pub fn try_pop(&self) -> Option<BlockKey> {
        self.queue.lock().pop_front()
    }

    /// Waits until a key is available and returns it.
    pub async fn pop(&self) -> BlockKey {
        loop {
            let notified = self.available.notified();
            if let Some(key) = self.try_pop() {
                return key;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
