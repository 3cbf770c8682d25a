//! # Command Layer
//!
//! String-in, serializable-out operations for an operator-facing command
//! surface:
//!
//! | Command | Output |
//! |---------|--------|
//! | `wantlist [--peer <id>]` | [`KeyList`] |
//! | `stat` | [`StatSnapshot`] |
//! | `unwant <key>...` | nothing |
//! | `ledger <peer>` | [`Receipt`] |
//!
//! Every command first binds the node context (online, block exchange) and
//! then parses its arguments. Rendering outputs as text is left to the
//! caller.

mod context;
mod error;

pub use context::{CommandContext, NodeContext};
pub use error::{CommandError, ErrorKind};

use serde::{Deserialize, Serialize};
use shared_types::{BlockKey, PeerId};
use tracing::debug;

use crate::domain::{Receipt, StatSnapshot};

/// A list of block keys, as returned by `wantlist`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyList {
    #[serde(rename = "Keys")]
    pub keys: Vec<BlockKey>,
}

fn parse_key(input: &str) -> Result<BlockKey, CommandError> {
    input.parse().map_err(|source| CommandError::MalformedKey {
        input: input.to_string(),
        source,
    })
}

fn parse_peer(input: &str) -> Result<PeerId, CommandError> {
    input.parse().map_err(|source| CommandError::MalformedPeerId {
        input: input.to_string(),
        source,
    })
}

/// Removes keys from the local wantlist.
///
/// At least one key is required. All keys are parsed before anything is
/// canceled: one malformed key cancels nothing.
pub fn unwant<K>(node: &NodeContext, keys: &[K]) -> Result<(), CommandError>
where
    K: AsRef<str>,
{
    let ctx = CommandContext::bind(node)?;
    if keys.is_empty() {
        return Err(CommandError::MissingArgument { name: "key" });
    }
    let keys = keys
        .iter()
        .map(|k| parse_key(k.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(count = keys.len(), "[qc-18] unwant");
    ctx.exchange().cancel_wants(&keys);
    Ok(())
}

/// The local wantlist, or the wantlist last announced by `peer`.
pub fn wantlist(node: &NodeContext, peer: Option<&str>) -> Result<KeyList, CommandError> {
    let ctx = CommandContext::bind(node)?;
    let keys = match peer {
        Some(peer) => ctx.exchange().wantlist_for_peer(&parse_peer(peer)?),
        None => ctx.exchange().wantlist(),
    };
    Ok(KeyList { keys })
}

/// Exchange statistics.
pub fn stat(node: &NodeContext) -> Result<StatSnapshot, CommandError> {
    let ctx = CommandContext::bind(node)?;
    Ok(ctx.exchange().stat()?)
}

/// Ledger receipt for `peer`.
pub fn ledger(node: &NodeContext, peer: &str) -> Result<Receipt, CommandError> {
    let ctx = CommandContext::bind(node)?;
    let peer = parse_peer(peer)?;
    Ok(ctx.exchange().ledger_for_peer(&peer))
}
