//! # Error Types
//!
//! Errors raised while parsing identifiers supplied by external callers.

use thiserror::Error;

/// Failure to parse a [`BlockKey`](crate::BlockKey) or [`PeerId`](crate::PeerId)
/// from its text form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Input was empty or whitespace only.
    #[error("Empty identifier")]
    Empty,

    /// Input had the wrong number of hex characters.
    #[error("Invalid length: expected {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Input contained non-hex characters.
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),
}
