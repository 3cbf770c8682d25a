//! Command-layer errors.

use shared_types::IdentifierError;
use thiserror::Error;

use crate::events::ExchangeError;

/// Who is at fault for a failed command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad invocation: wrong mode or malformed argument.
    Client,
    /// Node misconfiguration or exchange failure.
    Internal,
}

/// Command-layer errors.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("This command must be run in online mode; start the node first")]
    NotOnline,

    #[error("Argument '{name}' is required")]
    MissingArgument { name: &'static str },

    #[error("Malformed block key '{input}': {source}")]
    MalformedKey {
        input: String,
        source: IdentifierError,
    },

    #[error("Malformed peer id '{input}': {source}")]
    MalformedPeerId {
        input: String,
        source: IdentifierError,
    },

    #[error("Expected a block exchange, found '{found}'")]
    UnsupportedExchange { found: String },

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::NotOnline
            | CommandError::MissingArgument { .. }
            | CommandError::MalformedKey { .. }
            | CommandError::MalformedPeerId { .. } => ErrorKind::Client,
            CommandError::UnsupportedExchange { .. } | CommandError::Exchange(_) => {
                ErrorKind::Internal
            }
        }
    }
}
