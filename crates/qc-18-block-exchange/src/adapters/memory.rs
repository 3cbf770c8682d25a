//! # In-Memory Port Adapters
//!
//! ## Ports Implemented
//!
//! - `BlockStore` - [`InMemoryBlockStore`], a map of blocks by key
//! - `BlockTransport` - [`RecordingTransport`], records every send and
//!   broadcast, with failure and latency injection

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{Block, BlockKey, PeerId};
use tokio::sync::Notify;

use crate::events::{TransportError, WantMessage};
use crate::ports::outbound::{BlockStore, BlockTransport};

// =============================================================================
// BlockStore Adapter
// =============================================================================

/// Block storage backed by a `HashMap`.
#[derive(Default)]
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<BlockKey, Block>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `block` under its key. Returns the key.
    pub fn insert(&self, block: Block) -> BlockKey {
        let key = block.key();
        self.blocks.write().insert(key, block);
        key
    }

    pub fn remove(&self, key: &BlockKey) -> Option<Block> {
        self.blocks.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn has_block(&self, key: &BlockKey) -> bool {
        self.blocks.read().contains_key(key)
    }

    fn get_block(&self, key: &BlockKey) -> Option<Block> {
        self.blocks.read().get(key).cloned()
    }
}

// =============================================================================
// BlockTransport Adapter
// =============================================================================

/// Transport that delivers nothing and remembers everything.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(PeerId, BlockKey)>>,
    broadcasts: Mutex<Vec<WantMessage>>,
    fail_next: AtomicUsize,
    attempts: AtomicUsize,
    disconnected: RwLock<HashSet<PeerId>>,
    latency: RwLock<HashMap<PeerId, Duration>>,
    activity: Notify,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful sends, in completion order.
    pub fn sent(&self) -> Vec<(PeerId, BlockKey)> {
        self.sent.lock().clone()
    }

    /// Keys successfully sent to `peer`, in completion order.
    pub fn sent_to(&self, peer: &PeerId) -> Vec<BlockKey> {
        self.sent
            .lock()
            .iter()
            .filter(|(p, _)| p == peer)
            .map(|(_, key)| *key)
            .collect()
    }

    pub fn broadcasts(&self) -> Vec<WantMessage> {
        self.broadcasts.lock().clone()
    }

    /// Send attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The next `count` sends fail with `SendFailed`.
    pub fn fail_next_sends(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Sends to `peer` fail with `PeerNotConnected` until [`Self::reconnect`].
    pub fn disconnect(&self, peer: PeerId) {
        self.disconnected.write().insert(peer);
    }

    pub fn reconnect(&self, peer: &PeerId) {
        self.disconnected.write().remove(peer);
    }

    /// Every send to `peer` takes `delay` before completing.
    pub fn set_latency(&self, peer: PeerId, delay: Duration) {
        self.latency.write().insert(peer, delay);
    }

    /// Waits until at least `count` sends succeeded. `false` on timeout.
    pub async fn wait_for_sends(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.sent.lock().len() >= count)
            .await
    }

    /// Waits until at least `count` broadcasts happened. `false` on timeout.
    pub async fn wait_for_broadcasts(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.broadcasts.lock().len() >= count)
            .await
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn() -> bool) -> bool {
        let wait = async {
            loop {
                let notified = self.activity.notified();
                if done() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BlockTransport for RecordingTransport {
    async fn send_block(&self, peer: PeerId, block: Block) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.latency.read().get(&peer).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.disconnected.read().contains(&peer) {
            return Err(TransportError::PeerNotConnected(peer));
        }
        if self.take_failure() {
            return Err(TransportError::SendFailed {
                peer,
                reason: "injected failure".to_string(),
            });
        }

        self.sent.lock().push((peer, block.key()));
        self.activity.notify_waiters();
        Ok(())
    }

    async fn broadcast(&self, message: WantMessage) -> Result<(), TransportError> {
        self.broadcasts.lock().push(message);
        self.activity.notify_waiters();
        Ok(())
    }
}
