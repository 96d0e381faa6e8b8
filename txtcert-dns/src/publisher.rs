//! DNS record publisher
//!
//! Replaces records by name against a [`DnsProvider`]: resolve the hosting
//! zone, delete every record carrying the target name, then create the new
//! one. The delete-then-create window is not transactional; concurrent
//! external edits of the same name can interleave. Callers serialise
//! replaces per name.

use std::net::Ipv4Addr;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{DnsError, DnsResult};
use crate::provider::{normalize_domain, DnsProvider, DnsRecord, NewRecord, RecordType, Zone};

/// 📡 Idempotent record replacement on top of a DNS provider
#[derive(Debug, Clone)]
pub struct RecordPublisher {
    provider: Arc<dyn DnsProvider>,
}

impl RecordPublisher {
    pub fn new(provider: Arc<dyn DnsProvider>) -> Self {
        Self { provider }
    }

    /// Get the DNS provider name
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Resolve the zone hosting `domain`
    ///
    /// Tries an exact-name lookup first, then picks the longest listed zone
    /// that `domain` falls under.
    pub async fn resolve_zone(&self, domain: &str) -> DnsResult<Zone> {
        let host = normalize_domain(domain).trim_end_matches('.').to_ascii_lowercase();

        if let Some(zone) = self.provider.find_zone(&host).await? {
            if zone.contains(&host) {
                debug!(domain = %domain, zone = %zone.name, "Zone resolved by exact name");
                return Ok(zone);
            }
        }

        let zones = self.provider.list_zones().await?;
        let zone = zones
            .into_iter()
            .filter(|z| z.contains(&host))
            .max_by_key(|z| z.name.trim_end_matches('.').len())
            .ok_or_else(|| DnsError::ZoneNotFound {
                domain: domain.to_string(),
            })?;

        debug!(domain = %domain, zone = %zone.name, zone_id = %zone.id, "Zone resolved by suffix");
        Ok(zone)
    }

    /// 🔁 Replace every record named `record_name` (relative to the zone) with one TXT record
    pub async fn replace_txt(
        &self,
        domain: &str,
        record_name: &str,
        value: &str,
        ttl: u32,
    ) -> DnsResult<DnsRecord> {
        self.replace(domain, record_name, RecordType::Txt, value, ttl).await
    }

    /// 🔁 Replace every record named `record_name` (relative to the zone) with one A record
    pub async fn replace_a(
        &self,
        domain: &str,
        record_name: &str,
        address: Ipv4Addr,
        ttl: u32,
    ) -> DnsResult<DnsRecord> {
        self.replace(domain, record_name, RecordType::A, &address.to_string(), ttl)
            .await
    }

    /// 🧹 Delete every record named `record_name`; succeeds when nothing matches
    ///
    /// Returns the number of records removed.
    pub async fn delete_all_by_name(&self, domain: &str, record_name: &str) -> DnsResult<usize> {
        let zone = self.resolve_zone(domain).await?;
        let fqdn = zone.fqdn(record_name);
        let removed = self.purge(&zone, &fqdn).await?;

        if removed > 0 {
            info!(record = %fqdn, removed, "🧹 Removed records");
        }
        Ok(removed)
    }

    async fn replace(
        &self,
        domain: &str,
        record_name: &str,
        record_type: RecordType,
        content: &str,
        ttl: u32,
    ) -> DnsResult<DnsRecord> {
        let zone = self.resolve_zone(domain).await?;
        let fqdn = zone.fqdn(record_name);

        let removed = self.purge(&zone, &fqdn).await?;

        let record = NewRecord {
            record_type,
            name: fqdn.clone(),
            content: content.to_string(),
            ttl,
        };
        let created = self.provider.create_record(&zone, &record).await?;

        info!(
            record = %fqdn,
            record_type = record_type.as_str(),
            zone = %zone.name,
            replaced = removed,
            provider = self.provider.name(),
            "🚀 Record published"
        );
        Ok(created)
    }

    /// Delete all records named `fqdn` concurrently; any failure fails the purge
    async fn purge(&self, zone: &Zone, fqdn: &str) -> DnsResult<usize> {
        let existing = self.provider.list_records(zone, fqdn).await?;
        if existing.is_empty() {
            return Ok(0);
        }

        debug!(record = %fqdn, count = existing.len(), "Deleting existing records");

        let results = join_all(
            existing
                .iter()
                .map(|record| self.provider.delete_record(zone, &record.id)),
        )
        .await;

        let mut first_error = None;
        for (record, result) in existing.iter().zip(results) {
            if let Err(e) = result {
                warn!(record = %fqdn, record_id = %record.id, error = %e, "❌ Record deletion failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(existing.len()),
        }
    }
}
