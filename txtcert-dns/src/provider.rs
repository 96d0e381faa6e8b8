//! DNS provider trait
//!
//! Defines the record-level interface a hosted DNS API must expose, plus the
//! zone and record name helpers shared by the publisher and the ACME flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::error::DnsResult;

/// ACME challenge record name prefix
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// Record name denoting the zone apex
pub const ZONE_APEX: &str = "@";

/// A hosted zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

impl Zone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Whether `host` is the zone apex or lies underneath it
    pub fn contains(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.');
        let zone = self.name.trim_end_matches('.');
        if host.eq_ignore_ascii_case(zone) {
            return true;
        }
        host.len() > zone.len()
            && host.as_bytes()[host.len() - zone.len() - 1] == b'.'
            && host
                .get(host.len() - zone.len()..)
                .is_some_and(|suffix| suffix.eq_ignore_ascii_case(zone))
    }

    /// Host name relative to the zone: `@` for the apex, `sub` for `sub.<zone>`
    pub fn relative_name(&self, host: &str) -> Option<String> {
        if !self.contains(host) {
            return None;
        }
        let host = host.trim_end_matches('.');
        let zone = self.name.trim_end_matches('.');
        if host.len() == zone.len() {
            Some(ZONE_APEX.to_string())
        } else {
            host.get(..host.len() - zone.len() - 1)
                .map(|label| label.to_ascii_lowercase())
        }
    }

    /// Join a zone-relative record name with the zone name
    pub fn fqdn(&self, record_name: &str) -> String {
        let zone = self.name.trim_end_matches('.');
        let record_name = record_name.trim_end_matches('.');

        if record_name.is_empty() || record_name == ZONE_APEX || record_name.eq_ignore_ascii_case(zone) {
            zone.to_string()
        } else if self.contains(record_name) {
            record_name.to_string()
        } else {
            format!("{}.{}", record_name, zone)
        }
    }
}

/// Record types the publisher writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Txt,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Txt => "TXT",
        }
    }
}

/// An existing record as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub id: String,
    /// Fully-qualified name
    pub name: String,
    /// Provider's type string (`TXT`, `A`, `CNAME`, ...)
    pub record_type: String,
    pub content: String,
}

/// A record to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub record_type: RecordType,
    /// Fully-qualified name
    pub name: String,
    pub content: String,
    pub ttl: u32,
}

/// Hosted DNS API used by the [`RecordPublisher`](crate::RecordPublisher)
///
/// Implementations must be thread-safe; deletes of distinct record ids may
/// run concurrently.
#[async_trait]
pub trait DnsProvider: Send + Sync + Debug {
    /// Returns the provider name (e.g., "cloudflare")
    fn name(&self) -> &'static str;

    /// Look up a zone by its exact name
    async fn find_zone(&self, name: &str) -> DnsResult<Option<Zone>>;

    /// List every zone visible to the credential
    async fn list_zones(&self) -> DnsResult<Vec<Zone>>;

    /// List records of any type whose fully-qualified name equals `fqdn`
    async fn list_records(&self, zone: &Zone, fqdn: &str) -> DnsResult<Vec<DnsRecord>>;

    /// Delete one record. Deleting a record that no longer exists succeeds.
    async fn delete_record(&self, zone: &Zone, record_id: &str) -> DnsResult<()>;

    /// Create one record
    async fn create_record(&self, zone: &Zone, record: &NewRecord) -> DnsResult<DnsRecord>;
}

/// Strip the wildcard label: `*.example.com` becomes `example.com`
pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// Zone-relative name of the challenge record for `domain`
///
/// `example.com` in zone `example.com` gives `_acme-challenge`,
/// `sub.example.com` gives `_acme-challenge.sub`.
pub fn challenge_record_name(zone: &Zone, domain: &str) -> Option<String> {
    let relative = zone.relative_name(normalize_domain(domain))?;
    if relative == ZONE_APEX {
        Some(ACME_CHALLENGE_RECORD.to_string())
    } else {
        Some(format!("{}.{}", ACME_CHALLENGE_RECORD, relative))
    }
}
