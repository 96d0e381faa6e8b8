//! DNS propagation checking for DNS-01 challenges
//!
//! [`PropagationVerifier::verify`] is a single-shot check: it queries the
//! primary transport and, only when that returns no records at all, falls
//! back through the remaining transports in order. Polling belongs to the
//! caller.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use txtcert_core::config::PropagationConfig;

use crate::error::{DnsError, DnsResult, LookupError};

/// TXT record type code used in DoH JSON answers
const TXT_RECORD_TYPE: u16 = 16;

/// DoH JSON status codes
const DOH_NOERROR: u32 = 0;
const DOH_NXDOMAIN: u32 = 3;

/// Query transports, in fallback order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
    DoH,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Udp => "UDP",
            Transport::Tcp => "TCP",
            Transport::DoH => "DoH",
        })
    }
}

/// One way of fetching the TXT strings published at a name
#[async_trait]
pub trait TxtLookup: Send + Sync {
    fn transport(&self) -> Transport;

    /// TXT values at `fqdn`. An absent name or empty answer is `Ok(vec![])`.
    async fn lookup(&self, fqdn: &str) -> Result<Vec<String>, LookupError>;
}

/// UDP or forced-TCP lookups against a single resolver
#[derive(Debug)]
pub struct ResolverLookup {
    transport: Transport,
    resolver: TokioResolver,
}

impl ResolverLookup {
    /// Plain UDP queries to `server`
    pub fn udp(server: SocketAddr, timeout: Duration) -> Self {
        Self::build(Transport::Udp, Protocol::Udp, server, timeout)
    }

    /// TCP-only queries to `server`
    pub fn tcp(server: SocketAddr, timeout: Duration) -> Self {
        Self::build(Transport::Tcp, Protocol::Tcp, server, timeout)
    }

    fn build(transport: Transport, protocol: Protocol, server: SocketAddr, timeout: Duration) -> Self {
        let mut resolver_config = ResolverConfig::new();
        resolver_config.add_name_server(NameServerConfig::new(server, protocol));

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;
        opts.cache_size = 0; // Disable caching for propagation checks

        let resolver =
            Resolver::builder_with_config(resolver_config, TokioConnectionProvider::default())
                .with_options(opts)
                .build();

        Self { transport, resolver }
    }
}

#[async_trait]
impl TxtLookup for ResolverLookup {
    fn transport(&self) -> Transport {
        self.transport
    }

    async fn lookup(&self, fqdn: &str) -> Result<Vec<String>, LookupError> {
        match self.resolver.txt_lookup(fqdn).await {
            Ok(records) => Ok(records
                .iter()
                .map(|record| {
                    // TXT records can have multiple strings, join them
                    record
                        .txt_data()
                        .iter()
                        .map(|data| String::from_utf8_lossy(data))
                        .collect::<String>()
                })
                .collect()),
            Err(e) => {
                // NXDOMAIN or NOERROR with no records is expected during propagation
                let err_str = e.to_string().to_lowercase();
                if err_str.contains("no records found")
                    || err_str.contains("nxdomain")
                    || err_str.contains("record not found")
                {
                    Ok(Vec::new())
                } else {
                    Err(LookupError {
                        transport: self.transport,
                        name: fqdn.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

/// DNS-over-HTTPS lookups against a JSON endpoint (`?name=...&type=TXT`)
#[derive(Debug)]
pub struct DohLookup {
    client: Client,
    endpoint: String,
}

impl DohLookup {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> DnsResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            DnsError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn error(&self, fqdn: &str, message: impl Into<String>) -> LookupError {
        LookupError {
            transport: Transport::DoH,
            name: fqdn.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl TxtLookup for DohLookup {
    fn transport(&self) -> Transport {
        Transport::DoH
    }

    async fn lookup(&self, fqdn: &str) -> Result<Vec<String>, LookupError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("name", fqdn), ("type", "TXT")])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await
            .map_err(|e| self.error(fqdn, e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.error(fqdn, format!("HTTP {}", response.status())));
        }

        let answer: DohResponse = response
            .json()
            .await
            .map_err(|e| self.error(fqdn, format!("Failed to parse response: {}", e)))?;

        match answer.status {
            DOH_NOERROR => Ok(answer
                .answer
                .iter()
                .filter(|a| a.record_type == TXT_RECORD_TYPE)
                .map(|a| unquote_txt(&a.data))
                .collect()),
            DOH_NXDOMAIN => Ok(Vec::new()),
            rcode => Err(self.error(fqdn, format!("DNS status {}", rcode))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status", default)]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type", default)]
    record_type: u16,
    #[serde(default)]
    data: String,
}

/// Strip presentation quoting: `"abc" "def"` becomes `abcdef`
fn unquote_txt(data: &str) -> String {
    let data = data.trim();
    if !data.starts_with('"') {
        return data.to_string();
    }
    data.split('"').skip(1).step_by(2).collect()
}

/// 🔎 Checks whether an expected TXT value is visible
pub struct PropagationVerifier {
    /// Primary transport first, then fallbacks in order
    chain: Vec<Box<dyn TxtLookup>>,
}

impl PropagationVerifier {
    /// UDP then TCP against `resolver`, then DoH against `doh_endpoint`
    pub fn new(resolver: SocketAddr, doh_endpoint: &str, timeout: Duration) -> DnsResult<Self> {
        let chain: Vec<Box<dyn TxtLookup>> = vec![
            Box::new(ResolverLookup::udp(resolver, timeout)),
            Box::new(ResolverLookup::tcp(resolver, timeout)),
            Box::new(DohLookup::new(doh_endpoint, timeout)?),
        ];
        Ok(Self::with_transports(chain))
    }

    pub fn from_config(config: &PropagationConfig) -> DnsResult<Self> {
        Self::new(config.resolver, &config.doh_endpoint, config.query_timeout())
    }

    /// Custom transport chain; the first entry is the primary
    pub fn with_transports(chain: Vec<Box<dyn TxtLookup>>) -> Self {
        Self { chain }
    }

    /// Transports in the order they are consulted
    pub fn transports(&self) -> Vec<Transport> {
        self.chain.iter().map(|t| t.transport()).collect()
    }

    /// Whether `expected` is visible at `fqdn`
    pub async fn verify(&self, fqdn: &str, expected: &str) -> bool {
        self.probe(fqdn, expected).await.is_some()
    }

    /// The transport that saw `expected`, if any
    pub async fn probe(&self, fqdn: &str, expected: &str) -> Option<Transport> {
        let Some((primary, fallbacks)) = self.chain.split_first() else {
            return None;
        };

        let values = Self::query(primary.as_ref(), fqdn).await;
        if values.iter().any(|v| v == expected) {
            debug!(record = %fqdn, transport = %primary.transport(), "✅ TXT record matched");
            return Some(primary.transport());
        }
        if !values.is_empty() {
            debug!(
                record = %fqdn,
                transport = %primary.transport(),
                found = values.len(),
                "TXT records present but none match yet"
            );
            return None;
        }

        for fallback in fallbacks {
            info!(record = %fqdn, transport = %fallback.transport(), "🔁 Falling back to next transport");
            let values = Self::query(fallback.as_ref(), fqdn).await;
            if values.iter().any(|v| v == expected) {
                debug!(record = %fqdn, transport = %fallback.transport(), "✅ TXT record matched");
                return Some(fallback.transport());
            }
        }

        debug!(record = %fqdn, "TXT record not visible on any transport");
        None
    }

    /// Errors count as "no records" so the fallback chain continues
    async fn query(lookup: &dyn TxtLookup, fqdn: &str) -> Vec<String> {
        match lookup.lookup(fqdn).await {
            Ok(values) => {
                trace!(record = %fqdn, transport = %lookup.transport(), values = ?values, "TXT lookup");
                values
            }
            Err(e) => {
                warn!(record = %fqdn, transport = %lookup.transport(), error = %e, "⚠️ TXT lookup failed");
                Vec::new()
            }
        }
    }
}

impl fmt::Debug for PropagationVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagationVerifier")
            .field("transports", &self.transports())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    enum Answer {
        Values(Vec<&'static str>),
        Fail,
    }

    struct ScriptedLookup {
        transport: Transport,
        answer: Answer,
        calls: Arc<Mutex<Vec<Transport>>>,
    }

    #[async_trait]
    impl TxtLookup for ScriptedLookup {
        fn transport(&self) -> Transport {
            self.transport
        }

        async fn lookup(&self, fqdn: &str) -> Result<Vec<String>, LookupError> {
            self.calls.lock().push(self.transport);
            match &self.answer {
                Answer::Values(v) => Ok(v.iter().map(|s| s.to_string()).collect()),
                Answer::Fail => Err(LookupError {
                    transport: self.transport,
                    name: fqdn.to_string(),
                    message: "timed out".to_string(),
                }),
            }
        }
    }

    fn verifier(answers: [Answer; 3]) -> (PropagationVerifier, Arc<Mutex<Vec<Transport>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let chain = [Transport::Udp, Transport::Tcp, Transport::DoH]
            .into_iter()
            .zip(answers)
            .map(|(transport, answer)| {
                Box::new(ScriptedLookup {
                    transport,
                    answer,
                    calls: calls.clone(),
                }) as Box<dyn TxtLookup>
            })
            .collect();
        (PropagationVerifier::with_transports(chain), calls)
    }

    const NAME: &str = "_acme-challenge.example.com";

    #[tokio::test]
    async fn test_primary_match_short_circuits() {
        let (verifier, calls) = verifier([
            Answer::Values(vec!["other", "abcd1234"]),
            Answer::Values(vec!["abcd1234"]),
            Answer::Values(vec!["abcd1234"]),
        ]);
        assert_eq!(verifier.probe(NAME, "abcd1234").await, Some(Transport::Udp));
        assert_eq!(*calls.lock(), vec![Transport::Udp]);
    }

    #[tokio::test]
    async fn test_mismatch_does_not_fall_back() {
        let (verifier, calls) = verifier([
            Answer::Values(vec!["stale"]),
            Answer::Values(vec!["abcd1234"]),
            Answer::Values(vec!["abcd1234"]),
        ]);
        assert!(!verifier.verify(NAME, "abcd1234").await);
        assert_eq!(*calls.lock(), vec![Transport::Udp]);
    }

    #[tokio::test]
    async fn test_empty_primary_falls_back_to_tcp() {
        let (verifier, calls) = verifier([
            Answer::Values(vec![]),
            Answer::Values(vec!["abcd1234"]),
            Answer::Values(vec!["abcd1234"]),
        ]);
        assert_eq!(verifier.probe(NAME, "abcd1234").await, Some(Transport::Tcp));
        assert_eq!(*calls.lock(), vec![Transport::Udp, Transport::Tcp]);
    }

    #[tokio::test]
    async fn test_errors_fall_back_in_order() {
        let (verifier, calls) = verifier([
            Answer::Fail,
            Answer::Fail,
            Answer::Values(vec!["abcd1234"]),
        ]);
        assert_eq!(verifier.probe(NAME, "abcd1234").await, Some(Transport::DoH));
        assert_eq!(*calls.lock(), vec![Transport::Udp, Transport::Tcp, Transport::DoH]);
    }

    #[tokio::test]
    async fn test_nothing_visible() {
        let (verifier, calls) = verifier([
            Answer::Values(vec![]),
            Answer::Values(vec!["stale"]),
            Answer::Fail,
        ]);
        assert!(!verifier.verify(NAME, "abcd1234").await);
        assert_eq!(calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let verifier = PropagationVerifier::with_transports(Vec::new());
        assert!(!verifier.verify(NAME, "x").await);
    }

    #[tokio::test]
    async fn test_default_chain_order() {
        let verifier = PropagationVerifier::from_config(&PropagationConfig::default()).unwrap();
        assert_eq!(
            verifier.transports(),
            vec![Transport::Udp, Transport::Tcp, Transport::DoH]
        );
    }

    #[test]
    fn test_unquote_txt() {
        assert_eq!(unquote_txt("\"abcd1234\""), "abcd1234");
        assert_eq!(unquote_txt("\"abc\" \"def\""), "abcdef");
        assert_eq!(unquote_txt("plain"), "plain");
        assert_eq!(unquote_txt(" \"\" "), "");
    }
}
