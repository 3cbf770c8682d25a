//! # Shared Types Crate
//!
//! Identifiers and payload types used across the block exchange.
//!
//! ## Design Principles
//!
//! - **Content addressing**: a [`BlockKey`] is derived from block bytes and
//!   compared by value only.
//! - **Pre-validated identity**: a [`PeerId`] is an opaque 32-byte value; the
//!   transport collaborator is responsible for authenticating it.
//! - **Text form**: both identifiers round-trip through lowercase hex, which is
//!   also their serde representation.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
