//! # Core Domain Entities
//!
//! Defines the fundamental data structures for block exchange.
//!
//! ## Entities
//!
//! - [`WantEntry`]: one (owner, key, priority) want
//! - [`Ledger`]: per-peer reciprocity counters
//! - [`Receipt`]: read-only derived view of a ledger
//! - [`ServeTask`]: "send this block to this peer"
//! - [`StatSnapshot`]: aggregate view for external inspection
//!
//! ## Wire Names
//!
//! `Receipt` and `StatSnapshot` serialize with the field names used by the
//! exchange's command output (`ProvideBufLen`, `DupBlksReceived`, `Recv`, ...),
//! so existing tooling can keep parsing them.

use serde::{Deserialize, Serialize};
use shared_types::{BlockKey, PeerId};

/// Priority attached to a want. Higher is served first.
pub type Priority = i32;

/// Whose wantlist an entry belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WantOwner {
    /// This node.
    Local,
    /// A remote peer, as last announced by that peer.
    Peer(PeerId),
}

/// A single want. At most one exists per (owner, key).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WantEntry {
    pub key: BlockKey,
    pub owner: WantOwner,
    pub priority: Priority,
}

/// Reciprocity counters for one remote peer.
///
/// `bytes_sent` and `bytes_received` only ever grow. The debt ratio is derived
/// on every read so it can never drift from the counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    pub peer: PeerId,
    /// Bytes we sent to the peer.
    pub bytes_sent: u64,
    /// Bytes the peer sent to us (duplicates included).
    pub bytes_received: u64,
    /// Number of blocks exchanged in either direction.
    pub exchange_count: u64,
}

impl Ledger {
    /// Creates an empty ledger for a newly seen peer.
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            bytes_sent: 0,
            bytes_received: 0,
            exchange_count: 0,
        }
    }

    /// `bytes_sent / max(bytes_received, 1)`.
    pub fn debt_ratio(&self) -> f64 {
        self.bytes_sent as f64 / self.bytes_received.max(1) as f64
    }

    /// Point-in-time receipt for this ledger.
    pub fn receipt(&self) -> Receipt {
        Receipt {
            peer: self.peer,
            debt_ratio: self.debt_ratio(),
            exchange_count: self.exchange_count,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
        }
    }
}

/// Read-only summary of a [`Ledger`], produced on demand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(rename = "Peer")]
    pub peer: PeerId,
    #[serde(rename = "Value")]
    pub debt_ratio: f64,
    #[serde(rename = "Exchanged")]
    pub exchange_count: u64,
    #[serde(rename = "Sent")]
    pub bytes_sent: u64,
    #[serde(rename = "Recv")]
    pub bytes_received: u64,
}

/// A pending "serve `key` to `peer`" operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeTask {
    pub peer: PeerId,
    pub key: BlockKey,
    /// Priority as announced by the peer.
    pub priority: Priority,
    /// Failed send attempts so far.
    pub attempts: u32,
}

/// Aggregate exchange statistics, built fresh for each query.
///
/// Fields are read from independently synchronized sources: each field is a
/// value that really existed, but two fields may be from slightly different
/// moments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatSnapshot {
    /// Keys waiting in the provide buffer.
    pub provide_buf_len: usize,
    /// Configured provide buffer capacity.
    pub provide_buf_capacity: usize,
    pub blocks_received: u64,
    pub blocks_sent: u64,
    pub data_received: u64,
    pub data_sent: u64,
    /// Blocks received that were already held locally.
    pub dup_blks_received: u64,
    /// Bytes of those duplicate blocks.
    pub dup_data_received: u64,
    /// Sends dropped after exhausting the retry budget.
    pub send_failures: u64,
    /// Sends requeued after a transport failure.
    pub send_retries: u64,
    /// Provide entries rejected because the buffer was full.
    pub provides_dropped: u64,
    /// Serve tasks queued across all peers.
    pub pending_tasks: usize,
    /// Local wantlist, highest priority first.
    pub wantlist: Vec<BlockKey>,
    /// Peers with a ledger.
    pub peers: Vec<PeerId>,
}
