//! Per-peer reciprocity ledgers.
//!
//! Each peer's ledger lives in its own `DashMap` shard entry, so updates for
//! different peers never contend and a query for one peer never waits on
//! traffic for another.

use dashmap::DashMap;
use shared_types::PeerId;

use super::{check_ledger_transition, Ledger, Receipt};

/// Owner of every [`Ledger`], keyed by peer.
///
/// Ledgers are created on first contact and live until [`LedgerStore::evict`]
/// is called by an external pruning policy.
#[derive(Debug, Default)]
pub struct LedgerStore {
    ledgers: DashMap<PeerId, Ledger>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the peer's ledger, creating an empty one if absent.
    pub fn ledger_for(&self, peer: &PeerId) -> Ledger {
        self.ledgers
            .entry(*peer)
            .or_insert_with(|| Ledger::new(*peer))
            .clone()
    }

    /// Adds `bytes` to the peer's sent total and counts one exchange.
    pub fn record_sent(&self, peer: &PeerId, bytes: u64) -> Ledger {
        self.update(peer, |ledger| {
            ledger.bytes_sent = ledger.bytes_sent.saturating_add(bytes);
        })
    }

    /// Adds `bytes` to the peer's received total and counts one exchange.
    pub fn record_received(&self, peer: &PeerId, bytes: u64) -> Ledger {
        self.update(peer, |ledger| {
            ledger.bytes_received = ledger.bytes_received.saturating_add(bytes);
        })
    }

    fn update(&self, peer: &PeerId, apply: impl FnOnce(&mut Ledger)) -> Ledger {
        let mut entry = self
            .ledgers
            .entry(*peer)
            .or_insert_with(|| Ledger::new(*peer));
        let before = entry.clone();
        apply(&mut entry);
        entry.exchange_count = entry.exchange_count.saturating_add(1);
        debug_assert!(check_ledger_transition(&before, &entry).is_ok());
        entry.clone()
    }

    /// Receipt for the peer, creating an empty ledger if absent.
    pub fn receipt_for(&self, peer: &PeerId) -> Receipt {
        self.ledger_for(peer).receipt()
    }

    /// Current debt ratio without creating a ledger (0.0 for unknown peers).
    pub fn debt_ratio(&self, peer: &PeerId) -> f64 {
        self.ledgers
            .get(peer)
            .map(|ledger| ledger.debt_ratio())
            .unwrap_or(0.0)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.ledgers.contains_key(peer)
    }

    /// Peers with a ledger, sorted for stable output.
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.ledgers.iter().map(|e| *e.key()).collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    /// Removes the peer's ledger. Never called by the exchange itself.
    pub fn evict(&self, peer: &PeerId) -> Option<Ledger> {
        self.ledgers.remove(peer).map(|(_, ledger)| ledger)
    }
}
