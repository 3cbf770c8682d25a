//! # Port Adapters
//!
//! In-memory implementations of the outbound ports, used by tests and by
//! embedders that wire their own transport later.

pub mod memory;

pub use memory::{InMemoryBlockStore, RecordingTransport};
