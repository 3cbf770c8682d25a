//! Ports layer (Hexagonal Architecture)
//!
//! - **inbound**: what the node and the command layer call
//! - **outbound**: what the exchange needs from transport and storage

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
