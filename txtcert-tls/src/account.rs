//! ACME account persistence and the shared account session
//!
//! 👤 One credentials file per (directory URL, email) identity. The session
//! loads it on first use, or registers a new account and persists it before
//! any order is placed with it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use txtcert_core::CaEndpoint;

use crate::acme::{AccountCredentialsJson, AcmeAccount, AcmeDirectory};
use crate::error::{AcmeError, AcmeResult, StorageError};
use crate::persist::{read_optional, write_atomic};

/// 🗄️ Account credentials on disk
#[derive(Debug, Clone)]
pub struct AccountStore {
    dir: PathBuf,
}

impl AccountStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Hex SHA-256 of `directory_url + "_" + email`
    pub fn identity(directory_url: &str, email: &str) -> String {
        let digest = Sha256::digest(format!("{}_{}", directory_url, email).as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Credentials file for an identity
    pub fn path_for(&self, directory_url: &str, email: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", Self::identity(directory_url, email)))
    }

    /// 📂 Load persisted credentials, if any
    pub async fn load(
        &self,
        directory_url: &str,
        email: &str,
    ) -> Result<Option<AccountCredentialsJson>, StorageError> {
        let path = self.path_for(directory_url, email);
        let Some(content) = read_optional(&path).await? else {
            return Ok(None);
        };

        let credentials = serde_json::from_str(&content).map_err(|e| StorageError::Malformed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        debug!("📂 Loaded account credentials from {:?}", path);
        Ok(Some(credentials))
    }

    /// 💾 Persist credentials, replacing any previous file for the identity
    pub async fn save(
        &self,
        directory_url: &str,
        email: &str,
        credentials: &AccountCredentialsJson,
    ) -> Result<PathBuf, StorageError> {
        let path = self.path_for(directory_url, email);
        let json = serde_json::to_vec_pretty(credentials)
            .map_err(|e| StorageError::Invalid(e.to_string()))?;
        write_atomic(&path, &json, true).await?;
        Ok(path)
    }
}

/// 🔐 Lazily initialised account for one CA identity
///
/// Constructed once and shared by every issuance attempt; the account is
/// resolved on first use and kept for the life of the session.
pub struct AcmeSession {
    ca: CaEndpoint,
    email: String,
    directory: Arc<dyn AcmeDirectory>,
    store: AccountStore,
    account: RwLock<Option<Arc<dyn AcmeAccount>>>,
}

impl AcmeSession {
    pub fn new(
        ca: CaEndpoint,
        email: impl Into<String>,
        directory: Arc<dyn AcmeDirectory>,
        store: AccountStore,
    ) -> Self {
        Self {
            ca,
            email: email.into(),
            directory,
            store,
            account: RwLock::new(None),
        }
    }

    pub fn ca(&self) -> &CaEndpoint {
        &self.ca
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Whether the account has been resolved yet
    pub async fn is_ready(&self) -> bool {
        self.account.read().await.is_some()
    }

    /// The account, loading or registering it on first call
    pub async fn account(&self) -> AcmeResult<Arc<dyn AcmeAccount>> {
        if let Some(account) = self.account.read().await.as_ref() {
            return Ok(account.clone());
        }

        let mut slot = self.account.write().await;
        if let Some(account) = slot.as_ref() {
            return Ok(account.clone());
        }

        let account = self.load_or_register().await?;
        *slot = Some(account.clone());
        Ok(account)
    }

    async fn load_or_register(&self) -> AcmeResult<Arc<dyn AcmeAccount>> {
        let directory_url = &self.ca.directory_url;

        if let Some(credentials) = self.store.load(directory_url, &self.email).await? {
            info!(email = %self.email, ca = %self.ca.name, "📂 Restoring ACME account");
            let account = self.directory.restore(credentials).await?;
            info!(email = %self.email, "✅ ACME account restored");
            return Ok(account);
        }

        if self.ca.eab_required && self.ca.eab.is_none() {
            return Err(AcmeError::Config(format!(
                "{} requires external account binding credentials",
                self.ca.name
            )));
        }

        let (account, credentials) = self.directory.register(&self.ca, &self.email).await?;
        let path = self
            .store
            .save(directory_url, &self.email, &credentials)
            .await?;
        info!(email = %self.email, path = ?path, "✅ ACME account registered");
        Ok(account)
    }
}

impl fmt::Debug for AcmeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcmeSession")
            .field("ca", &self.ca.name)
            .field("email", &self.email)
            .field("store", &self.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::AcmeOrder;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullAccount;

    #[async_trait]
    impl AcmeAccount for NullAccount {
        async fn new_order(&self, domain: &str) -> AcmeResult<Box<dyn AcmeOrder>> {
            Err(AcmeError::OrderCreation {
                domain: domain.to_string(),
                message: "unused".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct CountingDirectory {
        registrations: AtomicUsize,
        restores: AtomicUsize,
    }

    #[async_trait]
    impl AcmeDirectory for CountingDirectory {
        async fn register(
            &self,
            _ca: &CaEndpoint,
            email: &str,
        ) -> AcmeResult<(Arc<dyn AcmeAccount>, AccountCredentialsJson)> {
            let n = self.registrations.fetch_add(1, Ordering::SeqCst);
            Ok((Arc::new(NullAccount), json!({"id": n, "email": email})))
        }

        async fn restore(
            &self,
            _credentials: AccountCredentialsJson,
        ) -> AcmeResult<Arc<dyn AcmeAccount>> {
            self.restores.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullAccount))
        }
    }

    #[test]
    fn test_identity_is_stable_hex() {
        let a = AccountStore::identity("https://acme.test/dir", "ops@example.com");
        let b = AccountStore::identity("https://acme.test/dir", "ops@example.com");
        let c = AccountStore::identity("https://acme.test/dir", "other@example.com");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_register_once_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let directory = Arc::new(CountingDirectory::default());

        for _ in 0..3 {
            let session = AcmeSession::new(
                CaEndpoint::custom("https://acme.test/dir"),
                "ops@example.com",
                directory.clone(),
                AccountStore::new(dir.path()),
            );
            session.account().await.unwrap();
            session.account().await.unwrap();
            assert!(session.is_ready().await);
        }

        assert_eq!(directory.registrations.load(Ordering::SeqCst), 1);
        assert_eq!(directory.restores.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_eab_required_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let directory = Arc::new(CountingDirectory::default());
        let session = AcmeSession::new(
            CaEndpoint::zerossl(),
            "ops@example.com",
            directory.clone(),
            AccountStore::new(dir.path()),
        );

        let err = session.account().await.err().unwrap();
        assert!(matches!(err, AcmeError::Config(_)));
        assert_eq!(directory.registrations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::new(dir.path());
        let path = store.path_for("https://acme.test/dir", "ops@example.com");
        std::fs::write(&path, "not json").unwrap();

        let err = store
            .load("https://acme.test/dir", "ops@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Malformed { .. }));
    }
}
