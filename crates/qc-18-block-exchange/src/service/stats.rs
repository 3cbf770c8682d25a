//! Point-in-time statistics.

use std::sync::Arc;

use crate::domain::{LedgerStore, ProvideBuffer, StatSnapshot};
use crate::metrics::ExchangeMetrics;
use crate::ports::BlockStore;
use crate::service::{DecisionEngine, WantManager};

/// Builds a [`StatSnapshot`] from the live components.
///
/// No global lock is taken: each field is read from its own source, so the
/// snapshot is consistent per field but not across fields.
pub struct StatsAggregator<S>
where
    S: BlockStore,
{
    metrics: Arc<ExchangeMetrics>,
    provide_buffer: Arc<ProvideBuffer>,
    wants: Arc<WantManager>,
    ledgers: Arc<LedgerStore>,
    engine: Arc<DecisionEngine<S>>,
}

impl<S> StatsAggregator<S>
where
    S: BlockStore,
{
    pub fn new(
        metrics: Arc<ExchangeMetrics>,
        provide_buffer: Arc<ProvideBuffer>,
        wants: Arc<WantManager>,
        ledgers: Arc<LedgerStore>,
        engine: Arc<DecisionEngine<S>>,
    ) -> Self {
        Self {
            metrics,
            provide_buffer,
            wants,
            ledgers,
            engine,
        }
    }

    pub fn snapshot(&self) -> StatSnapshot {
        let counters = self.metrics.snapshot();
        StatSnapshot {
            provide_buf_len: self.provide_buffer.len(),
            provide_buf_capacity: self.provide_buffer.capacity(),
            blocks_received: counters.blocks_received,
            blocks_sent: counters.blocks_sent,
            data_received: counters.data_received,
            data_sent: counters.data_sent,
            dup_blks_received: counters.dup_blocks_received,
            dup_data_received: counters.dup_data_received,
            send_failures: counters.send_failures,
            send_retries: counters.send_retries,
            provides_dropped: counters.provides_dropped,
            pending_tasks: self.engine.total_pending(),
            wantlist: self.wants.wantlist_for_self(),
            peers: self.ledgers.peers(),
        }
    }
}
