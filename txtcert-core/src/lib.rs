//! txtcert Core Library
//!
//! Shared configuration and error types for the txtcert workspace:
//! the CA endpoint descriptor, the resolved application configuration
//! and the loader that merges file, environment and CLI inputs.

pub mod config;
pub mod error;

pub use config::{AppConfig, CaEndpoint, ConfigLoader, ConfigOverrides, ExternalAccountBinding};
pub use error::{Error, Result};

/// txtcert version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
