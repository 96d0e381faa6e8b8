//! txtcert TLS Module
//!
//! Certificate issuance over DNS-01:
//! - ACME protocol seam with an instant-acme backend
//! - Account persistence and the shared account session
//! - The per-domain order state machine
//! - Renewal state and certificate output storage
//! - The lifecycle orchestrator that ties them together

pub mod account;
pub mod acme;
pub mod cert_store;
pub mod error;
pub mod orchestrator;
pub mod order;
pub mod renewal;

mod persist;

pub use account::{AccountStore, AcmeSession};
pub use acme::{
    AccountCredentialsJson, AcmeAccount, AcmeDirectory, AcmeOrder, ChallengeStatus, DnsChallenge,
    InstantAcmeDirectory, OrderProgress, OrderStatus,
};
pub use cert_store::CertStore;
pub use error::{AcmeError, AcmeResult, StorageError};
pub use orchestrator::{CycleReport, Orchestrator};
pub use order::{Certificate, IssuanceState, OrderManager, OrderSettings};
pub use renewal::RenewalStore;
