//! txtcert DNS Module
//!
//! DNS-01 plumbing:
//! - [`DnsProvider`] - record CRUD against a hosted DNS API (Cloudflare)
//! - [`RecordPublisher`] - zone resolution and idempotent delete-then-create replace
//! - [`PropagationVerifier`] - single-shot TXT visibility check with UDP → TCP → DoH fallback

pub mod error;
pub mod propagation;
pub mod provider;
pub mod providers;
pub mod publisher;

pub use error::{DnsError, DnsResult, LookupError};
pub use propagation::{DohLookup, PropagationVerifier, ResolverLookup, Transport, TxtLookup};
pub use provider::{
    challenge_record_name, normalize_domain, DnsProvider, DnsRecord, NewRecord, RecordType, Zone,
    ACME_CHALLENGE_RECORD, ZONE_APEX,
};
pub use providers::CloudflareProvider;
pub use publisher::RecordPublisher;
