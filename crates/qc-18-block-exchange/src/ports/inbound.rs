//! Inbound ports (API) for the Block Exchange subsystem.

use std::sync::Arc;

use shared_types::{BlockKey, PeerId};

use crate::domain::{Priority, Receipt, StatSnapshot};
use crate::events::ExchangeError;

/// Query and control surface used by the command layer.
pub trait BlockExchangeApi: Send + Sync {
    /// Removes `keys` from the local wantlist.
    ///
    /// Unknown keys are ignored. Calling again with the same keys is a no-op.
    fn cancel_wants(&self, keys: &[BlockKey]);

    /// Local wantlist, highest priority first.
    fn wantlist(&self) -> Vec<BlockKey>;

    /// Latest wantlist announced by `peer`. Empty for unknown peers.
    fn wantlist_for_peer(&self, peer: &PeerId) -> Vec<BlockKey>;

    /// Point-in-time statistics.
    fn stat(&self) -> Result<StatSnapshot, ExchangeError>;

    /// Receipt for `peer`, creating an empty ledger for unknown peers.
    fn ledger_for_peer(&self, peer: &PeerId) -> Receipt;
}

/// Receive events delivered by the transport, one call per decoded message.
///
/// Implementations must tolerate concurrent calls from many connections.
pub trait ExchangeEvents: Send + Sync {
    /// `peer` wants `key` at `priority`.
    fn on_want(&self, peer: PeerId, key: BlockKey, priority: Priority);

    /// `peer` no longer wants `key`.
    fn on_cancel(&self, peer: PeerId, key: BlockKey);

    /// `peer` sent us a block of `size_bytes`.
    ///
    /// Must be called before the block is written to the local store, so a
    /// block we already held is counted as a duplicate. Follow up with
    /// `ExchangeService::has_block` once it is stored.
    fn on_block(&self, peer: PeerId, key: BlockKey, size_bytes: u64);
}

/// Whatever exchange implementation the node is running.
///
/// Only block exchanges answer the command-layer queries; other
/// implementations return `None` from [`Exchange::block_exchange`].
pub trait Exchange: Send + Sync {
    /// Short implementation name, used in error messages.
    fn name(&self) -> &'static str;

    /// Capability check for the block-exchange query surface.
    fn block_exchange(self: Arc<Self>) -> Option<Arc<dyn BlockExchangeApi>> {
        None
    }
}
