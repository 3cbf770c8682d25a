//! Ordered wantlist for a single owner (this node or one remote peer).
//!
//! Keys are unique. Reads return highest priority first; equal priorities
//! keep the order in which the keys were first added.

use std::collections::HashMap;

use shared_types::BlockKey;

use super::{Priority, WantEntry, WantOwner};

/// Result of adding a key to a [`Wantlist`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Key was not present.
    Added,
    /// Key was present; its priority changed.
    PriorityChanged,
    /// Key was present; nothing changed.
    Unchanged,
}

impl InsertOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, InsertOutcome::Unchanged)
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    priority: Priority,
    seq: u64,
}

/// Wantlist of one owner.
#[derive(Clone, Debug)]
pub struct Wantlist {
    owner: WantOwner,
    entries: HashMap<BlockKey, Slot>,
    next_seq: u64,
}

impl Wantlist {
    pub fn new(owner: WantOwner) -> Self {
        Self {
            owner,
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Adds `key`, or raises its priority if `priority` is higher.
    ///
    /// Used for the local wantlist: re-wanting a block never lowers urgency.
    pub fn insert_or_raise(&mut self, key: BlockKey, priority: Priority) -> InsertOutcome {
        match self.entries.get_mut(&key) {
            Some(slot) if priority > slot.priority => {
                slot.priority = priority;
                InsertOutcome::PriorityChanged
            }
            Some(_) => InsertOutcome::Unchanged,
            None => self.insert_new(key, priority),
        }
    }

    /// Adds `key`, or replaces its priority with `priority`.
    ///
    /// Used for remote wantlists: the latest announcement wins.
    pub fn insert_or_replace(&mut self, key: BlockKey, priority: Priority) -> InsertOutcome {
        match self.entries.get_mut(&key) {
            Some(slot) if slot.priority != priority => {
                slot.priority = priority;
                InsertOutcome::PriorityChanged
            }
            Some(_) => InsertOutcome::Unchanged,
            None => self.insert_new(key, priority),
        }
    }

    fn insert_new(&mut self, key: BlockKey, priority: Priority) -> InsertOutcome {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, Slot { priority, seq });
        InsertOutcome::Added
    }

    /// Removes `key`. Returns whether it was present.
    pub fn remove(&mut self, key: &BlockKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn priority(&self, key: &BlockKey) -> Option<Priority> {
        self.entries.get(key).map(|slot| slot.priority)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys, highest priority first, ties by insertion order.
    pub fn keys(&self) -> Vec<BlockKey> {
        self.ordered().into_iter().map(|(key, _)| key).collect()
    }

    /// Full entries in the same order as [`Wantlist::keys`].
    pub fn entries(&self) -> Vec<WantEntry> {
        self.ordered()
            .into_iter()
            .map(|(key, priority)| WantEntry {
                key,
                owner: self.owner,
                priority,
            })
            .collect()
    }

    fn ordered(&self) -> Vec<(BlockKey, Priority)> {
        let mut items: Vec<(BlockKey, Slot)> =
            self.entries.iter().map(|(key, slot)| (*key, *slot)).collect();
        items.sort_by(|(_, a), (_, b)| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        items
            .into_iter()
            .map(|(key, slot)| (key, slot.priority))
            .collect()
    }
}
