//! Cumulative counters for block exchange.
//!
//! Every counter is an independent atomic, so recording never takes a lock
//! and readers see each field at some real value.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe exchange counters.
#[derive(Debug, Default)]
pub struct ExchangeMetrics {
    /// Blocks received from peers (duplicates included)
    pub blocks_received: AtomicU64,
    /// Bytes received from peers (duplicates included)
    pub data_received: AtomicU64,
    /// Blocks sent to peers
    pub blocks_sent: AtomicU64,
    /// Bytes sent to peers
    pub data_sent: AtomicU64,
    /// Received blocks that were already held locally
    pub dup_blocks_received: AtomicU64,
    /// Bytes of duplicate blocks
    pub dup_data_received: AtomicU64,
    /// Serve tasks dropped after exhausting retries
    pub send_failures: AtomicU64,
    /// Serve tasks requeued after a failed send
    pub send_retries: AtomicU64,
    /// Keys rejected by a full provide buffer
    pub provides_dropped: AtomicU64,
}

impl ExchangeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming block.
    pub fn record_block_received(&self, size_bytes: u64, duplicate: bool) {
        self.blocks_received.fetch_add(1, Ordering::Relaxed);
        self.data_received.fetch_add(size_bytes, Ordering::Relaxed);
        if duplicate {
            self.dup_blocks_received.fetch_add(1, Ordering::Relaxed);
            self.dup_data_received.fetch_add(size_bytes, Ordering::Relaxed);
        }
    }

    /// Record a completed send.
    pub fn record_block_sent(&self, size_bytes: u64) {
        self.blocks_sent.fetch_add(1, Ordering::Relaxed);
        self.data_sent.fetch_add(size_bytes, Ordering::Relaxed);
    }

    pub fn record_send_retry(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provide_dropped(&self) {
        self.provides_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_received: self.blocks_received.load(Ordering::Relaxed),
            data_received: self.data_received.load(Ordering::Relaxed),
            blocks_sent: self.blocks_sent.load(Ordering::Relaxed),
            data_sent: self.data_sent.load(Ordering::Relaxed),
            dup_blocks_received: self.dup_blocks_received.load(Ordering::Relaxed),
            dup_data_received: self.dup_data_received.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            send_retries: self.send_retries.load(Ordering::Relaxed),
            provides_dropped: self.provides_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`ExchangeMetrics`] at one moment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_received: u64,
    pub data_received: u64,
    pub blocks_sent: u64,
    pub data_sent: u64,
    pub dup_blocks_received: u64,
    pub dup_data_received: u64,
    pub send_failures: u64,
    pub send_retries: u64,
    pub provides_dropped: u64,
}
