//! # Core Domain Entities
//!
//! Defines the identifiers and payloads exchanged between nodes.
//!
//! ## Clusters
//!
//! - **Content**: [`BlockKey`], [`Block`]
//! - **Networking**: [`PeerId`]

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::errors::IdentifierError;

/// A 32-byte hash (SHA-256).
pub type Hash = [u8; 32];

/// Generates the shared text/serde plumbing for 32-byte identifiers.
macro_rules! hex_identifier {
    ($name:ident, $label:literal) => {
        impl $name {
            /// Length of the identifier in bytes.
            pub const LEN: usize = 32;

            /// Creates the identifier from raw bytes.
            pub const fn new(bytes: Hash) -> Self {
                Self(bytes)
            }

            /// Creates the identifier from a byte slice.
            ///
            /// Returns `None` if the slice is not exactly 32 bytes.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                let bytes: Hash = bytes.try_into().ok()?;
                Some(Self(bytes))
            }

            /// Raw identifier bytes.
            pub fn as_bytes(&self) -> &Hash {
                &self.0
            }

            /// Lowercase hex form, as accepted by [`FromStr`].
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s.is_empty() {
                    return Err(IdentifierError::Empty);
                }
                if s.len() != Self::LEN * 2 {
                    return Err(IdentifierError::InvalidLength {
                        expected: Self::LEN * 2,
                        actual: s.len(),
                    });
                }
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(s, &mut bytes)
                    .map_err(|e| IdentifierError::InvalidHex(e.to_string()))?;
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}…)", $label, &self.to_hex()[..12])
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

// =============================================================================
// CLUSTER A: CONTENT
// =============================================================================

/// Content-derived identifier of a block.
///
/// Two keys are the same key whenever their bytes are equal, regardless of
/// which peer or code path produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey(Hash);

hex_identifier!(BlockKey, "BlockKey");

impl BlockKey {
    /// Derives the key for a block payload (SHA-256 of the bytes).
    pub fn for_data(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self(key)
    }
}

/// A block payload together with its content key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    key: BlockKey,
    data: Vec<u8>,
}

impl Block {
    /// Creates a block, deriving its key from the payload.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            key: BlockKey::for_data(&data),
            data,
        }
    }

    pub fn key(&self) -> BlockKey {
        self.key
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// =============================================================================
// CLUSTER B: NETWORKING
// =============================================================================

/// Opaque identifier of a remote node, pre-validated by the transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerId(Hash);

hex_identifier!(PeerId, "PeerId");
