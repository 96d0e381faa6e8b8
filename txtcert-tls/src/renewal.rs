//! Renewal state store
//!
//! ⏰ Remembers when each domain last received a certificate. A domain is
//! eligible for issuance when it has no record or its record is at least the
//! renewal age old.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::persist::{read_optional, write_atomic};

/// 🗓️ Last successful issuance per domain, backed by one JSON file
#[derive(Debug, Clone)]
pub struct RenewalStore {
    path: PathBuf,
    renewal_age: Duration,
    records: BTreeMap<String, DateTime<Utc>>,
}

impl RenewalStore {
    pub fn new(path: impl AsRef<Path>, renewal_age_days: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            renewal_age: Duration::days(i64::from(renewal_age_days)),
            records: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 📂 Replace the in-memory mapping with the file's content
    ///
    /// A missing file is an empty mapping.
    pub async fn load(&mut self) -> Result<(), StorageError> {
        let Some(content) = read_optional(&self.path).await? else {
            debug!("No renewal state at {:?}, starting empty", self.path);
            self.records.clear();
            return Ok(());
        };

        self.records = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&content).map_err(|e| StorageError::Malformed {
                path: self.path.clone(),
                message: e.to_string(),
            })?
        };

        debug!("📂 Loaded {} renewal record(s)", self.records.len());
        Ok(())
    }

    /// 💾 Write the mapping to disk
    pub async fn save(&self) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&self.records)
            .map_err(|e| StorageError::Invalid(e.to_string()))?;
        write_atomic(&self.path, &json, false).await
    }

    pub fn last_issued(&self, domain: &str) -> Option<DateTime<Utc>> {
        self.records.get(domain).copied()
    }

    pub fn is_eligible(&self, domain: &str) -> bool {
        self.is_eligible_at(domain, Utc::now())
    }

    /// Eligible when no record exists or the record is at least the renewal age old
    pub fn is_eligible_at(&self, domain: &str, now: DateTime<Utc>) -> bool {
        match self.records.get(domain) {
            None => true,
            Some(issued) => now - *issued >= self.renewal_age,
        }
    }

    /// When an ineligible domain becomes eligible again
    pub fn next_eligible(&self, domain: &str) -> Option<DateTime<Utc>> {
        self.records.get(domain).map(|issued| *issued + self.renewal_age)
    }

    /// Record a successful issuance; an older timestamp never replaces a newer one
    pub fn record_success(&mut self, domain: &str, at: DateTime<Utc>) {
        let entry = self.records.entry(domain.to_string()).or_insert(at);
        if at > *entry {
            *entry = at;
        }
        info!(domain = %domain, issued = %entry.to_rfc3339(), "🗓️ Renewal recorded");
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
