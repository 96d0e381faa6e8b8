//! Error types for txtcert

use thiserror::Error;

/// Result type for txtcert core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for txtcert core
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration input. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
