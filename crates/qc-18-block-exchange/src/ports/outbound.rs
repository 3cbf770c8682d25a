//! Outbound ports (SPI) for the Block Exchange subsystem.

use async_trait::async_trait;
use shared_types::{Block, BlockKey, PeerId};

use crate::events::{TransportError, WantMessage};

/// Wire transport to connected peers.
#[async_trait]
pub trait BlockTransport: Send + Sync {
    /// Sends one block to `peer`.
    ///
    /// May wait on backpressure. Only the peer's own send worker waits.
    async fn send_block(&self, peer: PeerId, block: Block) -> Result<(), TransportError>;

    /// Announces a local wantlist change to every connected peer.
    async fn broadcast(&self, message: WantMessage) -> Result<(), TransportError>;
}

/// Local block storage. Synchronous point lookups.
pub trait BlockStore: Send + Sync {
    fn has_block(&self, key: &BlockKey) -> bool;

    fn get_block(&self, key: &BlockKey) -> Option<Block>;
}
