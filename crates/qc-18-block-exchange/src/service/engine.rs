//! # Decision Engine
//!
//! Decides which blocks go to which peers, and in what order.
//!
//! ## Flow
//!
//! ```text
//! on_want ──→ record want ──→ block held? ──yes──→ [peer queue] ──→ send worker
//!                                 │                                    │
//!                                 no                                   ↓
//!                                 ↓                          transport.send_block
//!                       block_available(key) ─── rescan ──→ [peer queue]
//! ```
//!
//! ## Synchronization
//!
//! - Remote wants live in the [`WantManager`] (sharded by peer).
//! - Each peer queue has its own mutex, never held across an `await`.
//! - Ledgers live in the [`LedgerStore`] (sharded by peer).
//!
//! A worker stuck on transport backpressure for one peer therefore never
//! blocks another peer's worker, nor incoming wants for its own peer.
//!
//! ## Fairness
//!
//! Every send to a peer is preceded by `FairnessPolicy::delay(debt_ratio)`.
//! [`DecisionEngine::service_order`] ranks peers by `FairnessPolicy::weight`
//! for callers that drive serving themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use shared_types::{BlockKey, PeerId};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, warn};

use crate::domain::{
    CancelOutcome, ExchangeConfig, LedgerStore, PeerTaskQueue, Priority, PushOutcome,
    RequeueOutcome, ServeTask,
};
use crate::metrics::ExchangeMetrics;
use crate::ports::{BlockStore, BlockTransport};
use crate::service::WantManager;

const SUBSYSTEM: &str = "qc-18";

/// What happened to an incoming want.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WantDecision {
    /// Block is held locally; a serve task is queued (or already in progress).
    Queued,
    /// Block is not held; the want is recorded until `block_available`.
    Deferred,
    /// Peer's wantlist is full; the want was dropped.
    Ignored,
}

/// Result of one serve attempt for a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Nothing queued for the peer.
    Idle,
    /// Block handed to the transport and accounted.
    Sent { key: BlockKey, size: u64 },
    /// Block no longer in local storage; task discarded, want kept.
    Unavailable(BlockKey),
    /// Send failed; task requeued.
    Retrying { key: BlockKey, attempts: u32 },
    /// Send failed and the retry budget is spent; task discarded.
    Dropped { key: BlockKey, attempts: u32 },
    /// Peer stopped wanting the block before it could be sent.
    Canceled(BlockKey),
}

/// One peer's task queue plus its worker wake-up signal.
struct PeerQueue {
    tasks: Mutex<PeerTaskQueue>,
    ready: Notify,
    /// Creation order, used to break fairness ties.
    arrival: u64,
}

impl PeerQueue {
    fn new(peer: PeerId, arrival: u64) -> Self {
        Self {
            tasks: Mutex::new(PeerTaskQueue::new(peer)),
            ready: Notify::new(),
            arrival,
        }
    }
}

/// Per-peer serving decisions and accounting.
pub struct DecisionEngine<S>
where
    S: BlockStore,
{
    config: ExchangeConfig,
    ledgers: Arc<LedgerStore>,
    wants: Arc<WantManager>,
    store: Arc<S>,
    metrics: Arc<ExchangeMetrics>,
    queues: DashMap<PeerId, Arc<PeerQueue>>,
    next_arrival: AtomicU64,
    /// Announces each newly created peer queue so a worker can be spawned.
    new_queues: mpsc::UnboundedSender<PeerId>,
}

impl<S> DecisionEngine<S>
where
    S: BlockStore,
{
    /// Creates the engine and the receiver of newly created peer queues.
    pub fn new(
        config: ExchangeConfig,
        ledgers: Arc<LedgerStore>,
        wants: Arc<WantManager>,
        store: Arc<S>,
        metrics: Arc<ExchangeMetrics>,
    ) -> (Self, mpsc::UnboundedReceiver<PeerId>) {
        let (new_queues, rx) = mpsc::unbounded_channel();
        let engine = Self {
            config,
            ledgers,
            wants,
            store,
            metrics,
            queues: DashMap::new(),
            next_arrival: AtomicU64::new(0),
            new_queues,
        };
        (engine, rx)
    }

    fn queue(&self, peer: &PeerId) -> Option<Arc<PeerQueue>> {
        self.queues.get(peer).map(|q| Arc::clone(q.value()))
    }

    fn queue_or_create(&self, peer: &PeerId) -> Arc<PeerQueue> {
        if let Some(queue) = self.queue(peer) {
            return queue;
        }
        let mut created = false;
        let entry = self.queues.entry(*peer).or_insert_with(|| {
            created = true;
            let arrival = self.next_arrival.fetch_add(1, Ordering::Relaxed);
            Arc::new(PeerQueue::new(*peer, arrival))
        });
        let queue = Arc::clone(entry.value());
        drop(entry);
        if created {
            // No receiver after shutdown; the queue still works synchronously.
            let _ = self.new_queues.send(*peer);
        }
        queue
    }

    fn is_current(&self, peer: &PeerId, queue: &Arc<PeerQueue>) -> bool {
        self.queues
            .get(peer)
            .map(|current| Arc::ptr_eq(current.value(), queue))
            .unwrap_or(false)
    }

    fn enqueue(&self, peer: &PeerId, key: BlockKey, priority: Priority) -> PushOutcome {
        self.push_to(peer, self.queue_or_create(peer), key, priority)
    }

    /// Pushes into `queue`, moving to a fresh queue if a disconnect retired
    /// `queue` in the meantime while the peer still wants `key`.
    fn push_to(
        &self,
        peer: &PeerId,
        mut queue: Arc<PeerQueue>,
        key: BlockKey,
        priority: Priority,
    ) -> PushOutcome {
        loop {
            let outcome = queue.tasks.lock().push(key, priority);
            if self.is_current(peer, &queue) {
                if matches!(outcome, PushOutcome::Queued | PushOutcome::Reprioritized) {
                    queue.ready.notify_one();
                }
                return outcome;
            }
            queue.tasks.lock().cancel(&key);
            if self.wants.peer_priority(peer, &key).is_none() {
                return outcome;
            }
            debug!(peer = %peer, key = %key, "[qc-18] Queue retired during push, retrying");
            queue = self.queue_or_create(peer);
        }
    }

    // =========================================================================
    // RECEIVE EVENTS
    // =========================================================================

    /// `peer` wants `key`.
    ///
    /// The want is always recorded (unless the peer's wantlist is full). A
    /// serve task is queued only if the block is held locally.
    pub fn receive_want(&self, peer: PeerId, key: BlockKey, priority: Priority) -> WantDecision {
        self.ledgers.ledger_for(&peer);

        if self.wants.record_peer_want(&peer, key, priority).is_none() {
            return WantDecision::Ignored;
        }

        if !self.store.has_block(&key) {
            debug!(peer = %peer, key = %key, "[qc-18] Want deferred, block not held");
            return WantDecision::Deferred;
        }

        let outcome = self.enqueue(&peer, key, priority);
        debug!(peer = %peer, key = %key, priority, ?outcome, "[qc-18] Want queued");
        WantDecision::Queued
    }

    /// `peer` no longer wants `key`. Safe when nothing is recorded.
    ///
    /// Returns whether a want or a task was removed.
    pub fn receive_cancel(&self, peer: PeerId, key: BlockKey) -> bool {
        let had_want = self.wants.record_peer_cancel(&peer, &key);
        let task = match self.queue(&peer) {
            Some(queue) => queue.tasks.lock().cancel(&key),
            None => CancelOutcome::NotFound,
        };
        if had_want || task != CancelOutcome::NotFound {
            debug!(peer = %peer, key = %key, ?task, "[qc-18] Peer canceled want");
        }
        had_want || task != CancelOutcome::NotFound
    }

    /// `peer` sent us `key`. Must be called before the block is written to
    /// the local store, so that duplicates can be detected.
    ///
    /// Returns whether the block was a duplicate. Duplicate bytes still count
    /// toward the peer's ledger.
    pub fn receive_block(&self, peer: PeerId, key: BlockKey, size_bytes: u64) -> bool {
        let duplicate = self.store.has_block(&key);
        let ledger = self.ledgers.record_received(&peer, size_bytes);
        self.metrics.record_block_received(size_bytes, duplicate);
        debug!(
            peer = %peer,
            key = %key,
            size = size_bytes,
            duplicate,
            debt_ratio = ledger.debt_ratio(),
            "[qc-18] Block received"
        );
        duplicate
    }

    /// Accounts a completed send of `key` to `peer` and retires its task.
    ///
    /// The peer's want for `key` is satisfied and removed.
    pub fn mark_sent(&self, peer: PeerId, key: BlockKey, size_bytes: u64) {
        let ledger = self.ledgers.record_sent(&peer, size_bytes);
        self.metrics.record_block_sent(size_bytes);
        if let Some(queue) = self.queue(&peer) {
            queue.tasks.lock().complete(&key);
        }
        self.wants.record_peer_cancel(&peer, &key);
        debug!(
            peer = %peer,
            key = %key,
            size = size_bytes,
            debt_ratio = ledger.debt_ratio(),
            "[qc-18] Block sent"
        );
    }

    /// `key` is now held locally: queue it for every peer that wants it.
    ///
    /// Returns the number of peers it was queued for.
    pub fn block_available(&self, key: &BlockKey) -> usize {
        let wanting = self.wants.peers_wanting(key);
        for (peer, priority) in &wanting {
            self.enqueue(peer, *key, *priority);
        }
        if !wanting.is_empty() {
            quantum_telemetry::log_block_event!(
                debug,
                SUBSYSTEM,
                "[qc-18] Block available, queued for waiting peers",
                key,
                peers = wanting.len()
            );
        }
        wanting.len()
    }

    /// Drops the peer's remote wantlist and pending tasks. Its ledger stays.
    ///
    /// The queue goes before the wants: a want recorded after this call
    /// always lands in a fresh queue.
    pub fn peer_disconnected(&self, peer: &PeerId) {
        let tasks = match self.queues.remove(peer) {
            Some((_, queue)) => {
                let dropped = queue.tasks.lock().clear();
                // Wake the worker so it notices its queue is gone.
                queue.ready.notify_one();
                dropped.len()
            }
            None => 0,
        };
        let wants = self.wants.remove_peer(peer);
        quantum_telemetry::log_peer_event!(
            info,
            SUBSYSTEM,
            "[qc-18] Peer disconnected",
            peer,
            wants_dropped = wants,
            tasks_dropped = tasks
        );
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Pending keys for `peer`, in the order they will be served.
    pub fn pending_tasks(&self, peer: &PeerId) -> Vec<BlockKey> {
        self.queue(peer)
            .map(|queue| queue.tasks.lock().pending_keys())
            .unwrap_or_default()
    }

    /// Whether a task for `key` is pending or in flight for `peer`.
    pub fn has_task(&self, peer: &PeerId, key: &BlockKey) -> bool {
        self.queue(peer)
            .map(|queue| {
                let tasks = queue.tasks.lock();
                tasks.is_pending(key) || tasks.is_in_flight(key)
            })
            .unwrap_or(false)
    }

    /// Pending tasks summed over all peers.
    pub fn total_pending(&self) -> usize {
        self.queues
            .iter()
            .map(|entry| entry.value().tasks.lock().len())
            .sum()
    }

    /// Peers with pending tasks, best first: higher fairness weight, then
    /// earlier queue creation.
    pub fn service_order(&self) -> Vec<PeerId> {
        let mut ranked: Vec<(PeerId, f64, u64)> = self
            .queues
            .iter()
            .filter(|entry| !entry.value().tasks.lock().is_empty())
            .map(|entry| {
                let peer = *entry.key();
                let weight = self.config.fairness.weight(self.ledgers.debt_ratio(&peer));
                (peer, weight, entry.value().arrival)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.into_iter().map(|(peer, _, _)| peer).collect()
    }

    // =========================================================================
    // SERVING
    // =========================================================================

    /// Serves the next task for `peer`, if any.
    pub async fn serve_next<T>(&self, peer: &PeerId, transport: &T) -> ServeOutcome
    where
        T: BlockTransport + ?Sized,
    {
        match self.queue(peer) {
            Some(queue) => self.serve_from(peer, &queue, transport).await,
            None => ServeOutcome::Idle,
        }
    }

    /// Serves one task for each peer with pending work, in [`Self::service_order`].
    pub async fn serve_round<T>(&self, transport: &T) -> Vec<(PeerId, ServeOutcome)>
    where
        T: BlockTransport + ?Sized,
    {
        let mut outcomes = Vec::new();
        for peer in self.service_order() {
            let outcome = self.serve_next(&peer, transport).await;
            outcomes.push((peer, outcome));
        }
        outcomes
    }

    async fn serve_from<T>(&self, peer: &PeerId, queue: &PeerQueue, transport: &T) -> ServeOutcome
    where
        T: BlockTransport + ?Sized,
    {
        if queue.tasks.lock().is_empty() {
            return ServeOutcome::Idle;
        }

        let delay = self.throttle_delay(peer);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let Some(task) = queue.tasks.lock().pop_next() else {
            return ServeOutcome::Idle;
        };
        self.serve_task(peer, queue, task, transport).await
    }

    /// Fairness delay owed before the next send to `peer`.
    fn throttle_delay(&self, peer: &PeerId) -> Duration {
        let delay = self.config.fairness.delay(self.ledgers.debt_ratio(peer));
        if !delay.is_zero() {
            debug!(peer = %peer, delay_ms = delay.as_millis() as u64, "[qc-18] Throttling peer");
        }
        delay
    }

    /// Sends one task already taken off `queue` and settles its outcome.
    async fn serve_task<T>(
        &self,
        peer: &PeerId,
        queue: &PeerQueue,
        task: ServeTask,
        transport: &T,
    ) -> ServeOutcome
    where
        T: BlockTransport + ?Sized,
    {

        // The want may have been canceled between queueing and now.
        if self.wants.peer_priority(peer, &task.key).is_none() {
            queue.tasks.lock().complete(&task.key);
            return ServeOutcome::Canceled(task.key);
        }

        let Some(block) = self.store.get_block(&task.key) else {
            queue.tasks.lock().complete(&task.key);
            warn!(peer = %peer, key = %task.key, "[qc-18] Queued block missing from store");
            return ServeOutcome::Unavailable(task.key);
        };

        let size = block.len() as u64;
        match transport.send_block(*peer, block).await {
            Ok(()) => {
                self.mark_sent(*peer, task.key, size);
                ServeOutcome::Sent {
                    key: task.key,
                    size,
                }
            }
            Err(error) => {
                let outcome = queue
                    .tasks
                    .lock()
                    .requeue_failed(&task.key, self.config.max_send_retries);
                match outcome {
                    RequeueOutcome::Requeued { attempts } => {
                        self.metrics.record_send_retry();
                        warn!(
                            peer = %peer,
                            key = %task.key,
                            attempts,
                            error = %error,
                            "[qc-18] Send failed, requeued"
                        );
                        queue.ready.notify_one();
                        ServeOutcome::Retrying {
                            key: task.key,
                            attempts,
                        }
                    }
                    RequeueOutcome::Dropped { attempts } => {
                        self.metrics.record_send_failure();
                        warn!(
                            peer = %peer,
                            key = %task.key,
                            attempts,
                            error = %error,
                            "[qc-18] Send failed, retry budget spent, task dropped"
                        );
                        ServeOutcome::Dropped {
                            key: task.key,
                            attempts,
                        }
                    }
                    RequeueOutcome::Canceled | RequeueOutcome::NotInFlight => {
                        debug!(peer = %peer, key = %task.key, "[qc-18] Failed send was canceled");
                        ServeOutcome::Canceled(task.key)
                    }
                }
            }
        }
    }

    /// Send loop for one peer queue. Exits on shutdown, or once the queue it
    /// was started for is removed or replaced.
    ///
    /// Shutdown interrupts a fairness delay at once. A send already on the
    /// wire gets `shutdown_grace` to finish; after that it is abandoned and
    /// its task returned to the queue.
    pub async fn run_peer_worker<T>(
        self: Arc<Self>,
        peer: PeerId,
        transport: Arc<T>,
        mut shutdown: watch::Receiver<bool>,
    ) where
        T: BlockTransport + ?Sized,
    {
        let Some(queue) = self.queue(&peer) else {
            return;
        };
        debug!(peer = %peer, "[qc-18] Send worker started");

        loop {
            if *shutdown.borrow() || !self.is_current(&peer, &queue) {
                break;
            }

            if queue.tasks.lock().is_empty() {
                tokio::select! {
                    _ = queue.ready.notified() => {}
                    _ = tokio::time::sleep(self.config.worker_idle_poll()) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            let delay = self.throttle_delay(&peer);
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => break,
                }
            }

            let Some(task) = queue.tasks.lock().pop_next() else {
                continue;
            };
            let key = task.key;
            let send = self.serve_task(&peer, &queue, task, transport.as_ref());
            tokio::pin!(send);
            tokio::select! {
                _ = &mut send => {}
                _ = shutdown.changed() => {
                    let grace = self.config.shutdown_grace();
                    if tokio::time::timeout(grace, &mut send).await.is_err() {
                        let requeued = queue.tasks.lock().abandon(&key);
                        warn!(
                            peer = %peer,
                            key = %key,
                            requeued,
                            "[qc-18] Send still pending at shutdown, abandoned"
                        );
                    }
                    break;
                }
            }
            tokio::task::yield_now().await;
        }

        debug!(peer = %peer, "[qc-18] Send worker stopped");
    }
}
