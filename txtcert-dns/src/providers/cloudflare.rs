//! Cloudflare DNS provider implementation
//!
//! Uses the Cloudflare v4 API with a bearer token.
//! API documentation: <https://developers.cloudflare.com/api/resources/dns/>

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{DnsError, DnsResult};
use crate::provider::{DnsProvider, DnsRecord, NewRecord, Zone};

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

const ZONES_PER_PAGE: u32 = 50;
const RECORDS_PER_PAGE: u32 = 100;

/// Cloudflare DNS provider
pub struct CloudflareProvider {
    client: Client,
    api_base: String,
    token: String,
}

impl fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a provider against the public Cloudflare API
    pub fn new(token: &str, timeout: Duration) -> DnsResult<Self> {
        Self::with_base(CLOUDFLARE_API_BASE, token, timeout)
    }

    /// Create a provider against a specific API base (proxies, tests)
    pub fn with_base(api_base: impl Into<String>, token: &str, timeout: Duration) -> DnsResult<Self> {
        if token.trim().is_empty() {
            return Err(DnsError::Configuration("Cloudflare API token is empty".to_string()));
        }

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DnsError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> DnsResult<Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DnsError::Api(format!("{}: request timed out", action))
                } else {
                    DnsError::Api(format!("{}: {}", action, e))
                }
            })?;

        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            let body = response.text().await.unwrap_or_default();
            return Err(DnsError::Authentication(format!("{}: {}", action, body)));
        }

        Ok(response)
    }

    /// Decode the Cloudflare envelope, turning `success: false` into an error message
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<Envelope<T>, String> {
        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => return Err(format!("HTTP {} - {}", status, body)),
            Err(e) => return Err(format!("Failed to parse response: {}", e)),
        };

        if !status.is_success() || !envelope.success {
            return Err(format!("HTTP {} - {}", status, envelope.error_summary()));
        }

        Ok(envelope)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        action: &str,
    ) -> DnsResult<Envelope<T>> {
        let request = self.client.get(self.url(path)).query(query);
        let response = self.send(request, action).await?;
        Self::decode(response)
            .await
            .map_err(|message| DnsError::Api(format!("{}: {}", action, message)))
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn find_zone(&self, name: &str) -> DnsResult<Option<Zone>> {
        let envelope: Envelope<Vec<ApiZone>> = self
            .get_json("zones", &[("name", name.to_string())], "Failed to look up zone")
            .await?;

        let zone = envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(name))
            .map(Zone::from);

        trace!(name = %name, found = zone.is_some(), "Exact zone lookup");
        Ok(zone)
    }

    async fn list_zones(&self) -> DnsResult<Vec<Zone>> {
        let mut zones = Vec::new();
        let mut page = 1;

        loop {
            let envelope: Envelope<Vec<ApiZone>> = self
                .get_json(
                    "zones",
                    &[
                        ("page", page.to_string()),
                        ("per_page", ZONES_PER_PAGE.to_string()),
                    ],
                    "Failed to list zones",
                )
                .await?;

            let total_pages = envelope.result_info.as_ref().map(|i| i.total_pages).unwrap_or(1);
            let batch = envelope.result.unwrap_or_default();
            let empty = batch.is_empty();
            zones.extend(batch.into_iter().map(Zone::from));

            if empty || page >= total_pages {
                break;
            }
            page += 1;
        }

        debug!(count = zones.len(), "Listed zones");
        Ok(zones)
    }

    async fn list_records(&self, zone: &Zone, fqdn: &str) -> DnsResult<Vec<DnsRecord>> {
        let envelope: Envelope<Vec<ApiRecord>> = self
            .get_json(
                &format!("zones/{}/dns_records", zone.id),
                &[
                    ("name", fqdn.to_string()),
                    ("per_page", RECORDS_PER_PAGE.to_string()),
                ],
                "Failed to list records",
            )
            .await?;

        let records: Vec<DnsRecord> = envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.name.eq_ignore_ascii_case(fqdn))
            .map(DnsRecord::from)
            .collect();

        trace!(zone = %zone.name, name = %fqdn, count = records.len(), "Listed records");
        Ok(records)
    }

    async fn delete_record(&self, zone: &Zone, record_id: &str) -> DnsResult<()> {
        debug!(zone = %zone.name, record_id = %record_id, "Deleting record");

        let request = self
            .client
            .delete(self.url(&format!("zones/{}/dns_records/{}", zone.id, record_id)));
        let response = self.send(request, "Failed to delete record").await?;

        // 404 is fine - record might already be deleted
        if response.status() == StatusCode::NOT_FOUND {
            debug!(record_id = %record_id, "Record already deleted");
            return Ok(());
        }

        Self::decode::<serde_json::Value>(response)
            .await
            .map(|_| ())
            .map_err(|message| DnsError::RecordDeleteFailed {
                record_id: record_id.to_string(),
                message,
            })
    }

    async fn create_record(&self, zone: &Zone, record: &NewRecord) -> DnsResult<DnsRecord> {
        debug!(
            zone = %zone.name,
            name = %record.name,
            record_type = record.record_type.as_str(),
            "Creating record"
        );

        let body = CreateRecordRequest {
            r#type: record.record_type.as_str(),
            name: &record.name,
            content: &record.content,
            ttl: record.ttl,
        };

        let request = self
            .client
            .post(self.url(&format!("zones/{}/dns_records", zone.id)))
            .json(&body);
        let response = self.send(request, "Failed to create record").await?;

        let envelope: Envelope<ApiRecord> =
            Self::decode(response)
                .await
                .map_err(|message| DnsError::RecordCreateFailed {
                    name: record.name.clone(),
                    message,
                })?;

        let created = envelope.result.ok_or_else(|| DnsError::RecordCreateFailed {
            name: record.name.clone(),
            message: "Response carried no record".to_string(),
        })?;

        debug!(record_id = %created.id, "Record created successfully");
        Ok(created.into())
    }
}

// Cloudflare API types

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

impl<T> Envelope<T> {
    fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "request unsuccessful".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default = "first_page")]
    total_pages: u32,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct ApiZone {
    id: String,
    name: String,
}

impl From<ApiZone> for Zone {
    fn from(zone: ApiZone) -> Self {
        Zone::new(zone.id, zone.name)
    }
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    content: String,
}

impl From<ApiRecord> for DnsRecord {
    fn from(record: ApiRecord) -> Self {
        DnsRecord {
            id: record.id,
            name: record.name,
            record_type: record.record_type,
            content: record.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<'a> {
    r#type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_rejected() {
        let err = CloudflareProvider::new("  ", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, DnsError::Configuration(_)));
    }

    #[test]
    fn test_url_join() {
        let provider =
            CloudflareProvider::with_base("http://localhost:9000/", "t", Duration::from_secs(5))
                .unwrap();
        assert_eq!(provider.url("zones"), "http://localhost:9000/zones");
    }

    #[test]
    fn test_envelope_error_summary() {
        let envelope: Envelope<Vec<ApiZone>> = serde_json::from_str(
            r#"{"success": false, "errors": [{"code": 9109, "message": "Invalid access token"}], "result": null}"#,
        )
        .unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.error_summary(), "9109: Invalid access token");
    }
}
