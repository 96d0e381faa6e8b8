//! Certificate output storage
//!
//! 💾 Writes each issued certificate as `<domain>.pem` (chain) and
//! `<domain>.key` (private key) in the output directory. Wildcard domains
//! drop their `*.` label in the file name.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::StorageError;
use crate::order::Certificate;
use crate::persist::{commit, discard, read_optional, stage, write_atomic};

/// Chain file extension
const CHAIN_EXTENSION: &str = "pem";
/// Private key file extension
const KEY_EXTENSION: &str = "key";

/// 🗄️ Certificate store for issued certificates
#[derive(Debug, Clone)]
pub struct CertStore {
    /// Output directory
    path: PathBuf,
}

impl CertStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem for a domain: `*.example.com` becomes `example.com`
    pub fn file_stem(domain: &str) -> &str {
        domain.strip_prefix("*.").unwrap_or(domain)
    }

    pub fn chain_path(&self, domain: &str) -> PathBuf {
        self.path
            .join(format!("{}.{}", Self::file_stem(domain), CHAIN_EXTENSION))
    }

    pub fn key_path(&self, domain: &str) -> PathBuf {
        self.path
            .join(format!("{}.{}", Self::file_stem(domain), KEY_EXTENSION))
    }

    /// 🚀 Create the output directory
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }

    /// 💾 Store a certificate.
    ///
    /// Both files are staged before either is replaced. If the chain cannot be
    /// swapped in, the previous key is put back so the pair stays matched.
    pub async fn store(&self, cert: &Certificate) -> Result<(), StorageError> {
        if cert.certificate_chain_pem.trim().is_empty() {
            return Err(StorageError::Invalid(format!("Empty certificate chain for {}", cert.domain)));
        }
        if cert.private_key_pem.trim().is_empty() {
            return Err(StorageError::Invalid(format!("Empty private key for {}", cert.domain)));
        }

        let key_path = self.key_path(&cert.domain);
        let chain_path = self.chain_path(&cert.domain);

        let previous_key = read_optional(&key_path).await?;

        let staged_key = stage(&key_path, cert.private_key_pem.as_bytes(), true).await?;
        let staged_chain =
            match stage(&chain_path, cert.certificate_chain_pem.as_bytes(), false).await {
                Ok(staged) => staged,
                Err(e) => {
                    discard(&staged_key).await;
                    return Err(e);
                }
            };

        if let Err(e) = commit(&staged_key, &key_path).await {
            discard(&staged_chain).await;
            return Err(e);
        }
        if let Err(e) = commit(&staged_chain, &chain_path).await {
            self.restore_key(&cert.domain, &key_path, previous_key).await;
            return Err(e);
        }

        match cert.not_after() {
            Some(expiry) => info!(
                domain = %cert.domain,
                path = ?chain_path,
                expires = %expiry.to_rfc3339(),
                "✅ Certificate stored"
            ),
            None => warn!(
                domain = %cert.domain,
                path = ?chain_path,
                "⚠️ Certificate stored but its expiry could not be read"
            ),
        }

        Ok(())
    }

    /// Put back the key that was replaced, or remove a key that had no predecessor
    async fn restore_key(&self, domain: &str, key_path: &Path, previous: Option<String>) {
        let restored = match previous {
            Some(old) => write_atomic(key_path, old.as_bytes(), true).await,
            None => tokio::fs::remove_file(key_path)
                .await
                .map_err(|e| StorageError::io(key_path, e)),
        };
        if let Err(e) = restored {
            error!(domain = %domain, error = %e, "❌ Failed to roll back certificate key");
        }
    }

    /// 🔍 Load the stored certificate for a domain, if both files exist
    pub async fn load(&self, domain: &str) -> Result<Option<Certificate>, StorageError> {
        let Some(certificate_chain_pem) = read_optional(&self.chain_path(domain)).await? else {
            return Ok(None);
        };
        let Some(private_key_pem) = read_optional(&self.key_path(domain)).await? else {
            return Ok(None);
        };

        Ok(Some(Certificate {
            domain: domain.to_string(),
            private_key_pem,
            certificate_chain_pem,
        }))
    }

    /// ⏰ Expiry of the stored leaf certificate
    pub async fn expiry(&self, domain: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.load(domain).await?.and_then(|cert| cert.not_after()))
    }
}
