//! # Block Exchange Service
//!
//! Wires the want manager, decision engine, ledger store and stats together
//! behind the inbound ports.
//!
//! ## Background tasks (after [`ExchangeService::start`])
//!
//! ```text
//! WantManager outbox ──→ broadcast pump ──→ transport.broadcast
//! DecisionEngine new queue ──→ supervisor ──spawn──→ one send worker per peer
//! ```
//!
//! Without `start` the service is fully usable synchronously; queued tasks
//! simply wait until something serves them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use shared_types::{BlockKey, PeerId};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::domain::{
    ExchangeConfig, InsertOutcome, LedgerStore, Priority, ProvideBuffer, Receipt, StatSnapshot,
};
use crate::events::{ExchangeError, WantMessage};
use crate::metrics::ExchangeMetrics;
use crate::ports::{BlockExchangeApi, BlockStore, BlockTransport, Exchange, ExchangeEvents};
use crate::service::{DecisionEngine, StatsAggregator, WantManager};

const SUBSYSTEM: &str = "qc-18";

/// The block exchange.
///
/// ## Dependencies
///
/// - `T: BlockTransport` - sends blocks and wantlist broadcasts
/// - `S: BlockStore` - local block lookups
pub struct ExchangeService<T, S>
where
    T: BlockTransport + 'static,
    S: BlockStore + 'static,
{
    config: ExchangeConfig,
    ledgers: Arc<LedgerStore>,
    wants: Arc<WantManager>,
    engine: Arc<DecisionEngine<S>>,
    stats: StatsAggregator<S>,
    provide_buffer: Arc<ProvideBuffer>,
    metrics: Arc<ExchangeMetrics>,
    transport: Arc<T>,
    /// Taken by `start`.
    outbox: Mutex<Option<mpsc::UnboundedReceiver<WantMessage>>>,
    /// Taken by `start`.
    new_queues: Mutex<Option<mpsc::UnboundedReceiver<PeerId>>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<T, S> ExchangeService<T, S>
where
    T: BlockTransport + 'static,
    S: BlockStore + 'static,
{
    pub fn new(
        config: ExchangeConfig,
        transport: Arc<T>,
        store: Arc<S>,
    ) -> Result<Self, ExchangeError> {
        config.validate()?;

        let metrics = Arc::new(ExchangeMetrics::new());
        let ledgers = Arc::new(LedgerStore::new());
        let provide_buffer = Arc::new(ProvideBuffer::new(config.provide_buffer_capacity));
        let (wants, outbox) = WantManager::new(config.max_wantlist_entries_per_peer);
        let wants = Arc::new(wants);
        let (engine, new_queues) = DecisionEngine::new(
            config.clone(),
            Arc::clone(&ledgers),
            Arc::clone(&wants),
            store,
            Arc::clone(&metrics),
        );
        let engine = Arc::new(engine);
        let stats = StatsAggregator::new(
            Arc::clone(&metrics),
            Arc::clone(&provide_buffer),
            Arc::clone(&wants),
            Arc::clone(&ledgers),
            Arc::clone(&engine),
        );
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            ledgers,
            wants,
            engine,
            stats,
            provide_buffer,
            metrics,
            transport,
            outbox: Mutex::new(Some(outbox)),
            new_queues: Mutex::new(Some(new_queues)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Spawns the broadcast pump and the send-worker supervisor.
    ///
    /// Must be called from within a tokio runtime. Fails if already started.
    pub fn start(&self) -> Result<(), ExchangeError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ExchangeError::AlreadyStarted);
        }

        let outbox = self
            .outbox
            .lock()
            .take()
            .ok_or_else(|| ExchangeError::InternalError("broadcast outbox missing".into()))?;
        let new_queues = self
            .new_queues
            .lock()
            .take()
            .ok_or_else(|| ExchangeError::InternalError("queue announcements missing".into()))?;

        let pump = tokio::spawn(Arc::clone(&self.wants).run_broadcast_pump(
            outbox,
            Arc::clone(&self.transport),
            self.shutdown.subscribe(),
        ));
        let supervisor = tokio::spawn(supervise_workers(
            Arc::clone(&self.engine),
            Arc::clone(&self.transport),
            new_queues,
            self.shutdown.subscribe(),
        ));
        self.tasks.lock().extend([pump, supervisor]);

        quantum_telemetry::log_event!(
            info,
            SUBSYSTEM,
            "[qc-18] Block exchange started",
            provide_buffer = self.config.provide_buffer_capacity,
            max_send_retries = self.config.max_send_retries
        );
        Ok(())
    }

    /// Signals every background task to stop and waits for them.
    ///
    /// Returns within roughly `shutdown_grace` even if a peer's transport
    /// never completes a send.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "[qc-18] Background task ended abnormally");
            }
        }
        info!("[qc-18] Block exchange stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !*self.shutdown.borrow()
    }

    // =========================================================================
    // LOCAL OPERATIONS
    // =========================================================================

    /// Adds `key` to the local wantlist (or raises its priority).
    pub fn want_block(&self, key: BlockKey, priority: Priority) -> InsertOutcome {
        self.wants.add_local_want(key, priority)
    }

    /// A block was written to the local store.
    ///
    /// Cancels our own want for it, queues it for peers that want it and
    /// offers it to the provide buffer. Returns `false` if the provide buffer
    /// was full and the key was dropped.
    pub fn has_block(&self, key: BlockKey) -> bool {
        self.wants.cancel_wants(&[key]);
        self.engine.block_available(&key);

        if self.provide_buffer.try_push(key) {
            return true;
        }
        self.metrics.record_provide_dropped();
        quantum_telemetry::log_block_event!(
            warn,
            SUBSYSTEM,
            "[qc-18] Provide buffer full, dropping key",
            key,
            capacity = self.provide_buffer.capacity()
        );
        false
    }

    pub fn peer_connected(&self, peer: PeerId) {
        self.ledgers.ledger_for(&peer);
        quantum_telemetry::log_peer_event!(info, SUBSYSTEM, "[qc-18] Peer connected", peer);
    }

    pub fn peer_disconnected(&self, peer: PeerId) {
        self.engine.peer_disconnected(&peer);
    }

    /// Next key to announce, waiting until one is available.
    pub async fn next_provide(&self) -> BlockKey {
        self.provide_buffer.pop().await
    }

    pub fn try_next_provide(&self) -> Option<BlockKey> {
        self.provide_buffer.try_pop()
    }

    pub fn stats(&self) -> StatSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<DecisionEngine<S>> {
        &self.engine
    }

    pub fn ledgers(&self) -> &Arc<LedgerStore> {
        &self.ledgers
    }

    pub fn wants(&self) -> &Arc<WantManager> {
        &self.wants
    }
}

/// Spawns a send worker for every peer queue the engine announces.
async fn supervise_workers<T, S>(
    engine: Arc<DecisionEngine<S>>,
    transport: Arc<T>,
    mut new_queues: mpsc::UnboundedReceiver<PeerId>,
    mut shutdown: watch::Receiver<bool>,
) where
    T: BlockTransport + 'static,
    S: BlockStore + 'static,
{
    let mut workers = JoinSet::new();
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            peer = new_queues.recv() => match peer {
                Some(peer) => {
                    debug!(peer = %peer, "[qc-18] Spawning send worker");
                    workers.spawn(Arc::clone(&engine).run_peer_worker(
                        peer,
                        Arc::clone(&transport),
                        shutdown.clone(),
                    ));
                }
                None => break,
            },
            Some(_) = workers.join_next(), if !workers.is_empty() => {}
        }
    }
    while workers.join_next().await.is_some() {}
}

impl<T, S> Drop for ExchangeService<T, S>
where
    T: BlockTransport + 'static,
    S: BlockStore + 'static,
{
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl<T, S> BlockExchangeApi for ExchangeService<T, S>
where
    T: BlockTransport + 'static,
    S: BlockStore + 'static,
{
    fn cancel_wants(&self, keys: &[BlockKey]) {
        self.wants.cancel_wants(keys);
    }

    fn wantlist(&self) -> Vec<BlockKey> {
        self.wants.wantlist_for_self()
    }

    fn wantlist_for_peer(&self, peer: &PeerId) -> Vec<BlockKey> {
        self.wants.wantlist_for_peer(peer)
    }

    fn stat(&self) -> Result<StatSnapshot, ExchangeError> {
        Ok(self.stats.snapshot())
    }

    fn ledger_for_peer(&self, peer: &PeerId) -> Receipt {
        self.ledgers.receipt_for(peer)
    }
}

impl<T, S> ExchangeEvents for ExchangeService<T, S>
where
    T: BlockTransport + 'static,
    S: BlockStore + 'static,
{
    fn on_want(&self, peer: PeerId, key: BlockKey, priority: Priority) {
        self.engine.receive_want(peer, key, priority);
    }

    fn on_cancel(&self, peer: PeerId, key: BlockKey) {
        self.engine.receive_cancel(peer, key);
    }

    fn on_block(&self, peer: PeerId, key: BlockKey, size_bytes: u64) {
        self.engine.receive_block(peer, key, size_bytes);
    }
}

impl<T, S> Exchange for ExchangeService<T, S>
where
    T: BlockTransport + 'static,
    S: BlockStore + 'static,
{
    fn name(&self) -> &'static str {
        "block-exchange"
    }

    fn block_exchange(self: Arc<Self>) -> Option<Arc<dyn BlockExchangeApi>> {
        Some(self)
    }
}
