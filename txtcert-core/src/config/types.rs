//! Configuration type definitions
//!
//! These types represent the runtime configuration for txtcert.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// ACME directory URLs
pub mod directory {
    /// 🏭 Let's Encrypt Production - for real certificates
    pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
    /// 🧪 Let's Encrypt Staging - for testing (not trusted)
    pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";
    /// ZeroSSL - requires external account binding
    pub const ZEROSSL: &str = "https://acme.zerossl.com/v2/DV90";
}

/// External account binding credentials issued by the CA
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalAccountBinding {
    /// Key identifier
    pub key_id: String,
    /// Base64url-encoded HMAC key
    pub hmac_key: String,
}

impl fmt::Debug for ExternalAccountBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalAccountBinding")
            .field("key_id", &self.key_id)
            .field("hmac_key", &"<redacted>")
            .finish()
    }
}

/// 🏛️ Certificate authority endpoint descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaEndpoint {
    /// Human readable name, used in logs
    pub name: String,
    /// ACME directory URL
    pub directory_url: String,
    /// Optional external account binding
    #[serde(default)]
    pub eab: Option<ExternalAccountBinding>,
    /// Whether the CA refuses registrations without EAB
    #[serde(default)]
    pub eab_required: bool,
}

impl CaEndpoint {
    /// Let's Encrypt production
    pub fn lets_encrypt() -> Self {
        Self {
            name: "letsencrypt".to_string(),
            directory_url: directory::LETS_ENCRYPT_PRODUCTION.to_string(),
            eab: None,
            eab_required: false,
        }
    }

    /// Let's Encrypt staging
    pub fn lets_encrypt_staging() -> Self {
        Self {
            name: "letsencrypt-staging".to_string(),
            directory_url: directory::LETS_ENCRYPT_STAGING.to_string(),
            eab: None,
            eab_required: false,
        }
    }

    /// ZeroSSL
    pub fn zerossl() -> Self {
        Self {
            name: "zerossl".to_string(),
            directory_url: directory::ZEROSSL.to_string(),
            eab: None,
            eab_required: true,
        }
    }

    /// A custom directory
    pub fn custom(directory_url: impl Into<String>) -> Self {
        Self {
            name: "custom".to_string(),
            directory_url: directory_url.into(),
            eab: None,
            eab_required: false,
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "letsencrypt" | "lets-encrypt" => Some(Self::lets_encrypt()),
            "letsencrypt-staging" | "staging" => Some(Self::lets_encrypt_staging()),
            "zerossl" => Some(Self::zerossl()),
            _ => None,
        }
    }

    /// Attach external account binding credentials
    pub fn with_eab(mut self, key_id: impl Into<String>, hmac_key: impl Into<String>) -> Self {
        self.eab = Some(ExternalAccountBinding {
            key_id: key_id.into(),
            hmac_key: hmac_key.into(),
        });
        self
    }
}

impl Default for CaEndpoint {
    fn default() -> Self {
        Self::lets_encrypt()
    }
}

/// Root configuration for txtcert
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Certificate authority
    #[serde(default)]
    pub ca: CaEndpoint,

    /// ACME account contact email
    #[serde(default)]
    pub email: String,

    /// Cloudflare API token (bearer credential)
    #[serde(default)]
    pub cloudflare_token: String,

    /// Domains to manage, processed in order
    #[serde(default)]
    pub domains: Vec<String>,

    /// State and output directories
    #[serde(default)]
    pub paths: PathsConfig,

    /// Check cycle settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// DNS provider settings
    #[serde(default)]
    pub dns: DnsConfig,

    /// Propagation check settings
    #[serde(default)]
    pub propagation: PropagationConfig,

    /// CA challenge validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Order finalization settings
    #[serde(default)]
    pub finalize: FinalizeConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("ca", &self.ca)
            .field("email", &self.email)
            .field("cloudflare_token", &"<redacted>")
            .field("domains", &self.domains)
            .field("paths", &self.paths)
            .field("schedule", &self.schedule)
            .field("dns", &self.dns)
            .field("propagation", &self.propagation)
            .field("validation", &self.validation)
            .field("finalize", &self.finalize)
            .finish()
    }
}

/// Directories used for persisted state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Holds the renewal timestamp file
    pub config_dir: PathBuf,
    /// Certificate and key output
    pub cert_dir: PathBuf,
    /// ACME account credentials, one file per identity
    pub account_dir: PathBuf,
}

impl PathsConfig {
    /// Defaults rooted at `base`, with the container certificate location
    /// when running inside Docker.
    pub fn rooted_at(base: &Path, in_container: bool) -> Self {
        let cert_dir = if in_container {
            PathBuf::from("/cert")
        } else {
            base.join("cert")
        };

        Self {
            config_dir: base.join("config"),
            cert_dir,
            account_dir: base.join("account"),
        }
    }

    /// Detect defaults from the working directory and the container marker
    pub fn detect() -> Self {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::rooted_at(&base, Path::new("/.dockerenv").exists())
    }

    /// Renewal state file
    pub fn renewal_file(&self) -> PathBuf {
        self.config_dir.join("certtimes.json")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::detect()
    }
}

/// ⏰ Check cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Sleep between cycles
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Issuance attempts per domain per cycle
    #[serde(default = "default_attempts")]
    pub attempts_per_domain: u32,
    /// Minimum age of the last success before reissuing
    #[serde(default = "default_renewal_age")]
    pub renewal_age_days: u32,
}

fn default_check_interval() -> u64 {
    60 * 60 // 1 hour
}

fn default_attempts() -> u32 {
    3
}

fn default_renewal_age() -> u32 {
    7
}

impl ScheduleConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            attempts_per_domain: default_attempts(),
            renewal_age_days: default_renewal_age(),
        }
    }
}

/// 📡 DNS provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Provider API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Provider request timeout
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,
    /// TTL for challenge records
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl: u32,
    /// Delete challenge records once the CA has finished validating
    #[serde(default = "default_true")]
    pub cleanup_challenge_records: bool,
}

fn default_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

fn default_challenge_ttl() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

impl DnsConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_timeout_secs: default_api_timeout(),
            challenge_ttl: default_challenge_ttl(),
            cleanup_challenge_records: true,
        }
    }
}

/// Propagation check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Primary resolver for UDP and TCP queries
    #[serde(default = "default_resolver")]
    pub resolver: SocketAddr,
    /// DNS-over-HTTPS JSON endpoint
    #[serde(default = "default_doh_endpoint")]
    pub doh_endpoint: String,
    /// Per-query timeout
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    /// Wait after publishing before the first check
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
    /// Wait between checks
    #[serde(default = "default_propagation_interval")]
    pub poll_interval_secs: u64,
    /// Checks before giving up
    #[serde(default = "default_propagation_polls")]
    pub max_polls: u32,
}

fn default_resolver() -> SocketAddr {
    SocketAddr::from(([8, 8, 8, 8], 53))
}

fn default_doh_endpoint() -> String {
    "https://dns.google/resolve".to_string()
}

fn default_query_timeout() -> u64 {
    5
}

fn default_settle_delay() -> u64 {
    60
}

fn default_propagation_interval() -> u64 {
    10
}

fn default_propagation_polls() -> u32 {
    60
}

impl PropagationConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            resolver: default_resolver(),
            doh_endpoint: default_doh_endpoint(),
            query_timeout_secs: default_query_timeout(),
            settle_delay_secs: default_settle_delay(),
            poll_interval_secs: default_propagation_interval(),
            max_polls: default_propagation_polls(),
        }
    }
}

/// CA challenge validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Wait between challenge status polls
    #[serde(default = "default_validation_interval")]
    pub poll_interval_secs: u64,
    /// Consecutive `invalid` polls before validation is re-submitted
    #[serde(default = "default_invalid_threshold")]
    pub invalid_threshold: u32,
    /// Hard ceiling on status polls
    #[serde(default = "default_validation_polls")]
    pub max_polls: u32,
}

fn default_validation_interval() -> u64 {
    60
}

fn default_invalid_threshold() -> u32 {
    20
}

fn default_validation_polls() -> u32 {
    60
}

impl ValidationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_validation_interval(),
            invalid_threshold: default_invalid_threshold(),
            max_polls: default_validation_polls(),
        }
    }
}

/// Order finalization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeConfig {
    /// Order polls while the CA is processing
    #[serde(default = "default_finalize_polls")]
    pub max_polls: u32,
    /// Delay used when the CA gives no usable retry-after
    #[serde(default = "default_fallback_delay")]
    pub fallback_delay_secs: u64,
    /// Smallest retry-after honoured
    #[serde(default = "default_min_retry_after")]
    pub min_retry_after_secs: u64,
    /// Largest retry-after honoured
    #[serde(default = "default_max_retry_after")]
    pub max_retry_after_secs: u64,
}

fn default_finalize_polls() -> u32 {
    10
}

fn default_fallback_delay() -> u64 {
    3
}

fn default_min_retry_after() -> u64 {
    1
}

fn default_max_retry_after() -> u64 {
    60
}

impl FinalizeConfig {
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_secs(self.fallback_delay_secs)
    }

    /// Clamp a CA supplied retry-after into the honoured range.
    ///
    /// Values outside the range fall back to the fixed delay.
    pub fn retry_delay(&self, retry_after: Option<Duration>) -> Duration {
        let min = Duration::from_secs(self.min_retry_after_secs);
        let max = Duration::from_secs(self.max_retry_after_secs);
        match retry_after {
            Some(d) if d >= min && d < max => d,
            _ => self.fallback_delay(),
        }
    }

    /// Overall polling budget: every poll at the fallback delay plus one
    /// maximal retry-after
    pub fn poll_window(&self) -> Duration {
        self.fallback_delay() * self.max_polls + Duration::from_secs(self.max_retry_after_secs)
    }
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            max_polls: default_finalize_polls(),
            fallback_delay_secs: default_fallback_delay(),
            min_retry_after_secs: default_min_retry_after(),
            max_retry_after_secs: default_max_retry_after(),
        }
    }
}
