//! DNS provider implementations
//!
//! Available providers:
//! - [`CloudflareProvider`] - Cloudflare v4 API

mod cloudflare;

pub use cloudflare::{CloudflareProvider, CLOUDFLARE_API_BASE};
