//! Error types shared across CarePulse crates.

use thiserror::Error;

/// Everything that can go wrong below the CLI.
#[derive(Debug, Error)]
pub enum CarePulseError {
    /// The key-value store could not be read or written.
    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An entity id did not resolve inside its collection.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CarePulseError>;
