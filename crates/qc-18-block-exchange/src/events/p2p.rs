//! P2P message types for the Block Exchange subsystem.

use shared_types::BlockKey;

use crate::domain::Priority;

/// Wantlist updates broadcast to connected peers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WantMessage {
    /// We want `key` (new, or with a raised priority).
    Want { key: BlockKey, priority: Priority },
    /// We no longer want these keys.
    Cancel { keys: Vec<BlockKey> },
}
