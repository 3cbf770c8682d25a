//! Node context handed to commands at call time.

use std::sync::Arc;

use crate::ports::{BlockExchangeApi, Exchange};

use super::CommandError;

/// What a command can see of the running node.
///
/// Built by the embedding node for each invocation; nothing here is global.
#[derive(Clone)]
pub struct NodeContext {
    online: bool,
    exchange: Option<Arc<dyn Exchange>>,
}

impl NodeContext {
    /// A network-attached node running `exchange`.
    pub fn online(exchange: Arc<dyn Exchange>) -> Self {
        Self {
            online: true,
            exchange: Some(exchange),
        }
    }

    /// A node without network access.
    pub fn offline() -> Self {
        Self {
            online: false,
            exchange: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn exchange(&self) -> Option<&Arc<dyn Exchange>> {
        self.exchange.as_ref()
    }
}

/// A node context that passed the online and capability checks.
pub struct CommandContext {
    exchange: Arc<dyn BlockExchangeApi>,
}

impl CommandContext {
    /// Resolves the block-exchange surface of `node`.
    ///
    /// Fails with `NotOnline` for offline nodes and `UnsupportedExchange` when
    /// the node runs a different exchange implementation.
    pub fn bind(node: &NodeContext) -> Result<Self, CommandError> {
        if !node.is_online() {
            return Err(CommandError::NotOnline);
        }
        let exchange = node
            .exchange()
            .ok_or_else(|| CommandError::UnsupportedExchange {
                found: "none".to_string(),
            })?;
        let name = exchange.name();
        let exchange = Arc::clone(exchange)
            .block_exchange()
            .ok_or_else(|| CommandError::UnsupportedExchange {
                found: name.to_string(),
            })?;
        Ok(Self { exchange })
    }

    pub fn exchange(&self) -> &Arc<dyn BlockExchangeApi> {
        &self.exchange
    }
}
