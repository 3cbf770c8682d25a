//! Per-peer queue of pending serve tasks.
//!
//! A key is in at most one of two states at a time:
//!
//! ```text
//! push ──→ [pending] ──pop_next──→ [in flight] ──complete──→ (gone)
//!              ↑                        │
//!              ├──requeue_failed────────┤   (bounded by the retry budget)
//!              └──abandon───────────────┘   (send interrupted, no attempt charged)
//! ```
//!
//! Pending tasks are ordered by priority (highest first) and then by arrival.
//! A cancel removes a pending task outright. An in-flight task cannot be
//! recalled, but it is flagged so a failed send is not retried.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use shared_types::{BlockKey, PeerId};

use super::{Priority, ServeTask};

/// Result of [`PeerTaskQueue::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// New pending task.
    Queued,
    /// Pending task existed; priority updated.
    Reprioritized,
    /// Pending task existed with the same priority.
    AlreadyQueued,
    /// Task is currently being sent; nothing queued.
    InFlight,
}

/// Result of [`PeerTaskQueue::cancel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Pending task removed.
    Removed,
    /// Task is in flight; it will complete but never be retried.
    InFlightFlagged,
    NotFound,
}

/// Result of [`PeerTaskQueue::requeue_failed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequeueOutcome {
    /// Back in the pending set for another attempt.
    Requeued { attempts: u32 },
    /// Retry budget exhausted; task removed.
    Dropped { attempts: u32 },
    /// Task was canceled while in flight; removed.
    Canceled,
    /// No in-flight task for this key.
    NotInFlight,
}

#[derive(Clone, Copy, Debug)]
struct PendingSlot {
    priority: Priority,
    seq: u64,
    attempts: u32,
}

#[derive(Clone, Copy, Debug)]
struct InFlightSlot {
    priority: Priority,
    seq: u64,
    attempts: u32,
    canceled: bool,
}

/// Ordered serve tasks for one peer.
#[derive(Debug)]
pub struct PeerTaskQueue {
    peer: PeerId,
    order: BTreeMap<(Reverse<Priority>, u64), BlockKey>,
    pending: HashMap<BlockKey, PendingSlot>,
    in_flight: HashMap<BlockKey, InFlightSlot>,
    next_seq: u64,
}

impl PeerTaskQueue {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            order: BTreeMap::new(),
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Queues `key` unless it is already pending or in flight.
    pub fn push(&mut self, key: BlockKey, priority: Priority) -> PushOutcome {
        if let Some(slot) = self.in_flight.get_mut(&key) {
            // Re-wanted while sending: a failure may be retried again.
            slot.canceled = false;
            return PushOutcome::InFlight;
        }

        if let Some(slot) = self.pending.get_mut(&key) {
            if slot.priority == priority {
                return PushOutcome::AlreadyQueued;
            }
            self.order.remove(&(Reverse(slot.priority), slot.seq));
            slot.priority = priority;
            self.order.insert((Reverse(priority), slot.seq), key);
            return PushOutcome::Reprioritized;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(
            key,
            PendingSlot {
                priority,
                seq,
                attempts: 0,
            },
        );
        self.order.insert((Reverse(priority), seq), key);
        PushOutcome::Queued
    }

    /// Cancels the task for `key`, if any.
    pub fn cancel(&mut self, key: &BlockKey) -> CancelOutcome {
        if let Some(slot) = self.pending.remove(key) {
            self.order.remove(&(Reverse(slot.priority), slot.seq));
            return CancelOutcome::Removed;
        }
        match self.in_flight.get_mut(key) {
            Some(slot) => {
                slot.canceled = true;
                CancelOutcome::InFlightFlagged
            }
            None => CancelOutcome::NotFound,
        }
    }

    /// Takes the next task to send and marks it in flight.
    pub fn pop_next(&mut self) -> Option<ServeTask> {
        let (&(Reverse(priority), seq), &key) = self.order.iter().next()?;
        self.order.remove(&(Reverse(priority), seq));
        let slot = self.pending.remove(&key)?;
        self.in_flight.insert(
            key,
            InFlightSlot {
                priority,
                seq,
                attempts: slot.attempts,
                canceled: false,
            },
        );
        Some(ServeTask {
            peer: self.peer,
            key,
            priority,
            attempts: slot.attempts,
        })
    }

    /// Removes the task for `key` after it was served.
    ///
    /// Accepts pending tasks too, for sends performed outside the queue.
    pub fn complete(&mut self, key: &BlockKey) -> bool {
        if self.in_flight.remove(key).is_some() {
            return true;
        }
        match self.pending.remove(key) {
            Some(slot) => {
                self.order.remove(&(Reverse(slot.priority), slot.seq));
                true
            }
            None => false,
        }
    }

    /// Handles a failed send of an in-flight task.
    ///
    /// The task goes back to its original position while it has fewer than
    /// `max_retries` failed attempts; otherwise it is dropped.
    pub fn requeue_failed(&mut self, key: &BlockKey, max_retries: u32) -> RequeueOutcome {
        let Some(slot) = self.in_flight.remove(key) else {
            return RequeueOutcome::NotInFlight;
        };
        if slot.canceled {
            return RequeueOutcome::Canceled;
        }
        let attempts = slot.attempts + 1;
        if attempts > max_retries {
            return RequeueOutcome::Dropped { attempts };
        }
        self.pending.insert(
            *key,
            PendingSlot {
                priority: slot.priority,
                seq: slot.seq,
                attempts,
            },
        );
        self.order.insert((Reverse(slot.priority), slot.seq), *key);
        RequeueOutcome::Requeued { attempts }
    }

    /// Returns an in-flight task whose send was abandoned before it finished.
    ///
    /// No attempt is charged: the task goes back to its original position,
    /// unless it was canceled meanwhile. Returns whether it was requeued.
    pub fn abandon(&mut self, key: &BlockKey) -> bool {
        let Some(slot) = self.in_flight.remove(key) else {
            return false;
        };
        if slot.canceled {
            return false;
        }
        self.pending.insert(
            *key,
            PendingSlot {
                priority: slot.priority,
                seq: slot.seq,
                attempts: slot.attempts,
            },
        );
        self.order.insert((Reverse(slot.priority), slot.seq), *key);
        true
    }

    /// Drops every task, returning the keys that were pending.
    pub fn clear(&mut self) -> Vec<BlockKey> {
        let keys = self.order.values().copied().collect();
        self.order.clear();
        self.pending.clear();
        for slot in self.in_flight.values_mut() {
            slot.canceled = true;
        }
        keys
    }

    pub fn is_pending(&self, key: &BlockKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn is_in_flight(&self, key: &BlockKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Pending keys in service order.
    pub fn pending_keys(&self) -> Vec<BlockKey> {
        self.order.values().copied().collect()
    }

    /// Number of pending (not in-flight) tasks.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }
}
