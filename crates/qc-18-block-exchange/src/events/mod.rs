//! Events and error types for the Block Exchange subsystem.

use shared_types::PeerId;
use thiserror::Error;

pub mod p2p;

pub use p2p::*;

/// Block exchange errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Exchange already started")]
    AlreadyStarted,

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Failures reported by a [`crate::ports::outbound::BlockTransport`].
///
/// These never surface to callers of the exchange; the engine retries or
/// drops the task and counts the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Peer not connected: {0}")]
    PeerNotConnected(PeerId),

    #[error("Send to {peer} failed: {reason}")]
    SendFailed { peer: PeerId, reason: String },
}
