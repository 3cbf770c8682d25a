//! Local and remote wantlists.
//!
//! The local wantlist sits behind one `RwLock`; remote wantlists are sharded
//! per peer in a `DashMap`. Every local change that peers should hear about
//! is pushed onto an outbox while the lock is still held, so broadcasts leave
//! in the same order the changes happened.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use shared_types::{BlockKey, PeerId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::{InsertOutcome, Priority, WantEntry, WantOwner, Wantlist};
use crate::events::WantMessage;
use crate::ports::BlockTransport;

const SUBSYSTEM: &str = "qc-18";

/// Owner of every want entry, local and remote.
pub struct WantManager {
    local: RwLock<Wantlist>,
    peers: DashMap<PeerId, Wantlist>,
    outbox: mpsc::UnboundedSender<WantMessage>,
    max_entries_per_peer: usize,
}

impl WantManager {
    /// Creates the manager and the receiving end of its broadcast outbox.
    pub fn new(max_entries_per_peer: usize) -> (Self, mpsc::UnboundedReceiver<WantMessage>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let manager = Self {
            local: RwLock::new(Wantlist::new(WantOwner::Local)),
            peers: DashMap::new(),
            outbox,
            max_entries_per_peer,
        };
        (manager, rx)
    }

    // =========================================================================
    // LOCAL WANTLIST
    // =========================================================================

    /// Adds `key` to the local wantlist or raises its priority.
    ///
    /// A broadcast is scheduled only when the wantlist actually changed.
    pub fn add_local_want(&self, key: BlockKey, priority: Priority) -> InsertOutcome {
        let mut local = self.local.write();
        let outcome = local.insert_or_raise(key, priority);
        if outcome.changed() {
            debug!(key = %key, priority, ?outcome, "[qc-18] Local want");
            self.publish(WantMessage::Want { key, priority });
        }
        outcome
    }

    /// Removes `keys` from the local wantlist.
    ///
    /// Returns the keys that were actually removed; a cancel broadcast is
    /// scheduled for those only. Unknown keys are ignored.
    pub fn cancel_wants(&self, keys: &[BlockKey]) -> Vec<BlockKey> {
        let mut local = self.local.write();
        let mut removed = Vec::new();
        for key in keys {
            if local.remove(key) && !removed.contains(key) {
                removed.push(*key);
            }
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "[qc-18] Local wants canceled");
            self.publish(WantMessage::Cancel {
                keys: removed.clone(),
            });
        }
        removed
    }

    /// Local wantlist keys, highest priority first.
    pub fn wantlist_for_self(&self) -> Vec<BlockKey> {
        self.local.read().keys()
    }

    pub fn local_entries(&self) -> Vec<WantEntry> {
        self.local.read().entries()
    }

    pub fn is_locally_wanted(&self, key: &BlockKey) -> bool {
        self.local.read().contains(key)
    }

    pub fn local_priority(&self, key: &BlockKey) -> Option<Priority> {
        self.local.read().priority(key)
    }

    fn publish(&self, message: WantMessage) {
        // A closed outbox means the exchange has shut down; state stays valid.
        let _ = self.outbox.send(message);
    }

    // =========================================================================
    // REMOTE WANTLISTS
    // =========================================================================

    /// Latest wantlist announced by `peer`; empty when unknown.
    pub fn wantlist_for_peer(&self, peer: &PeerId) -> Vec<BlockKey> {
        self.peers
            .get(peer)
            .map(|list| list.keys())
            .unwrap_or_default()
    }

    /// Records that `peer` wants `key`.
    ///
    /// Returns `None` when the want was ignored because the peer's wantlist
    /// is already at its size limit.
    pub fn record_peer_want(
        &self,
        peer: &PeerId,
        key: BlockKey,
        priority: Priority,
    ) -> Option<InsertOutcome> {
        let mut list = self
            .peers
            .entry(*peer)
            .or_insert_with(|| Wantlist::new(WantOwner::Peer(*peer)));
        if !list.contains(&key) && list.len() >= self.max_entries_per_peer {
            quantum_telemetry::log_peer_event!(
                warn,
                SUBSYSTEM,
                "[qc-18] Peer wantlist full, ignoring want",
                peer,
                key = %key,
                limit = self.max_entries_per_peer
            );
            return None;
        }
        Some(list.insert_or_replace(key, priority))
    }

    /// Records that `peer` no longer wants `key`. Returns whether it did.
    pub fn record_peer_cancel(&self, peer: &PeerId, key: &BlockKey) -> bool {
        self.peers
            .get_mut(peer)
            .map(|mut list| list.remove(key))
            .unwrap_or(false)
    }

    pub fn peer_priority(&self, peer: &PeerId, key: &BlockKey) -> Option<Priority> {
        self.peers.get(peer).and_then(|list| list.priority(key))
    }

    /// Every peer currently wanting `key`, with its announced priority.
    pub fn peers_wanting(&self, key: &BlockKey) -> Vec<(PeerId, Priority)> {
        let mut wanting: Vec<(PeerId, Priority)> = self
            .peers
            .iter()
            .filter_map(|entry| entry.value().priority(key).map(|p| (*entry.key(), p)))
            .collect();
        wanting.sort();
        wanting
    }

    /// Forgets everything `peer` announced. Returns how many wants were dropped.
    pub fn remove_peer(&self, peer: &PeerId) -> usize {
        self.peers
            .remove(peer)
            .map(|(_, list)| list.len())
            .unwrap_or(0)
    }

    /// Peers with a remote wantlist, sorted.
    pub fn known_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.peers.iter().map(|e| *e.key()).collect();
        peers.sort();
        peers
    }

    // =========================================================================
    // BROADCAST PUMP
    // =========================================================================

    /// Forwards outbox messages to the transport until shutdown.
    ///
    /// `Want` messages for keys that were canceled while queued are skipped.
    /// A broadcast still pending when shutdown is signalled is abandoned.
    pub async fn run_broadcast_pump<T>(
        self: Arc<Self>,
        mut outbox: mpsc::UnboundedReceiver<WantMessage>,
        transport: Arc<T>,
        mut shutdown: watch::Receiver<bool>,
    ) where
        T: BlockTransport + ?Sized,
    {
        info!("[qc-18] Want broadcast pump started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let message = tokio::select! {
                _ = shutdown.changed() => break,
                message = outbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            if let WantMessage::Want { key, .. } = &message {
                if !self.is_locally_wanted(key) {
                    debug!(key = %key, "[qc-18] Skipping stale want broadcast");
                    continue;
                }
            }

            tokio::select! {
                result = transport.broadcast(message) => {
                    if let Err(e) = result {
                        warn!(error = %e, "[qc-18] Want broadcast failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("[qc-18] Want broadcast pump stopped");
    }
}
