//! DNS error types

use thiserror::Error;

use crate::propagation::Transport;

/// Result type for DNS provider operations
pub type DnsResult<T> = Result<T, DnsError>;

/// Errors raised while talking to the DNS provider
#[derive(Debug, Error)]
pub enum DnsError {
    /// No hosted zone covers the domain
    #[error("Zone not found for domain '{domain}'")]
    ZoneNotFound { domain: String },

    /// The provider rejected the new record
    #[error("Failed to create record '{name}': {message}")]
    RecordCreateFailed { name: String, message: String },

    /// The provider refused to delete an existing record
    #[error("Failed to delete record '{record_id}': {message}")]
    RecordDeleteFailed { record_id: String, message: String },

    /// Credential rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transport failure or unexpected API response
    #[error("API request failed: {0}")]
    Api(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// A single TXT query failed on one transport.
///
/// Never escapes the verifier: it is logged and treated as "no records".
#[derive(Debug, Error)]
#[error("{transport} lookup for '{name}' failed: {message}")]
pub struct LookupError {
    pub transport: Transport,
    pub name: String,
    pub message: String,
}
