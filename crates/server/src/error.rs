//! Server error types.

use crate::config::ConfigError;
use thiserror::Error;

/// Errors that stop a server unit. Every variant is fatal to the unit that
/// returns it.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("shared state lock poisoned")]
    StorePoisoned,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
