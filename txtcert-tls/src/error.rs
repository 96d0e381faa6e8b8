//! Error types for certificate issuance

use std::path::PathBuf;

use thiserror::Error;
use txtcert_dns::DnsError;

use crate::acme::OrderStatus;

/// Result type for issuance operations
pub type AcmeResult<T> = Result<T, AcmeError>;

/// Errors raised by one issuance attempt
#[derive(Debug, Error)]
pub enum AcmeError {
    /// Missing or invalid configuration. Never retried within a cycle.
    #[error("⚙️ Configuration error: {0}")]
    Config(String),

    /// Account registration or restore failed
    #[error("👤 Account error: {0}")]
    Account(String),

    /// The CA refused or failed to create the order
    #[error("📝 Order creation failed for {domain}: {message}")]
    OrderCreation { domain: String, message: String },

    /// The DNS provider failed to publish the challenge record
    #[error("📡 DNS publish failed: {0}")]
    DnsPublish(#[from] DnsError),

    /// The challenge value never became visible
    #[error("⏰ Challenge record {record} not visible after {attempts} checks")]
    PropagationTimeout { record: String, attempts: u32 },

    /// The CA did not accept the challenge
    #[error("⚠️ CA validation failed for {domain}: {message}")]
    CaValidation { domain: String, message: String },

    /// The order ended in a status other than valid
    #[error("❌ Issuance failed for {domain}: order is {status:?}")]
    IssuanceFailed { domain: String, status: OrderStatus },

    /// Local state could not be read or written
    #[error("💾 Persistence error: {0}")]
    Persistence(#[from] StorageError),

    /// ACME transport or protocol failure
    #[error("🔴 ACME protocol error: {0}")]
    Protocol(String),
}

impl AcmeError {
    /// Whether another attempt may succeed without operator intervention
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AcmeError::Config(_))
    }
}

impl From<instant_acme::Error> for AcmeError {
    fn from(e: instant_acme::Error) -> Self {
        AcmeError::Protocol(e.to_string())
    }
}

/// Errors raised while reading or writing local state files
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("💥 IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("⚠️ Malformed file {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("⚠️ Invalid certificate: {0}")]
    Invalid(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_not_retryable() {
        assert!(!AcmeError::Config("missing email".to_string()).is_retryable());
        assert!(AcmeError::PropagationTimeout {
            record: "_acme-challenge.example.com".to_string(),
            attempts: 3,
        }
        .is_retryable());
        assert!(AcmeError::DnsPublish(DnsError::ZoneNotFound {
            domain: "sub.unknown.tld".to_string(),
        })
        .is_retryable());
    }

    #[test]
    fn test_storage_error_names_the_path() {
        let err = StorageError::io(
            "/cert/example.com.pem",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/cert/example.com.pem"));
    }
}
