//! Certificate lifecycle orchestration
//!
//! 🔄 Runs check cycles forever: for every configured domain, skip it when
//! its last issuance is recent, otherwise try up to the configured number of
//! attempts, then store the certificate and record the renewal.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use txtcert_core::AppConfig;
use txtcert_core::config::ScheduleConfig;
use txtcert_dns::{CloudflareProvider, PropagationVerifier, RecordPublisher};

use crate::account::{AccountStore, AcmeSession};
use crate::acme::InstantAcmeDirectory;
use crate::cert_store::CertStore;
use crate::error::{AcmeError, AcmeResult};
use crate::order::{Certificate, OrderManager, OrderSettings};
use crate::renewal::RenewalStore;

/// 📊 Outcome of one check cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Domains that received a new certificate
    pub issued: Vec<String>,
    /// Domains renewed recently enough to skip
    pub skipped: Vec<String>,
    /// Domains that exhausted their attempts or could not be stored
    pub failed: Vec<String>,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 🔐 Certificate lifecycle orchestrator
pub struct Orchestrator {
    domains: Vec<String>,
    schedule: ScheduleConfig,
    session: AcmeSession,
    orders: OrderManager,
    renewals: RenewalStore,
    certs: CertStore,
}

impl Orchestrator {
    pub fn new(
        domains: Vec<String>,
        schedule: ScheduleConfig,
        session: AcmeSession,
        orders: OrderManager,
        renewals: RenewalStore,
        certs: CertStore,
    ) -> Self {
        Self {
            domains,
            schedule,
            session,
            orders,
            renewals,
            certs,
        }
    }

    /// 🚀 Build the production stack: Cloudflare, public resolvers, instant-acme
    pub fn from_config(config: &AppConfig) -> AcmeResult<Self> {
        config
            .validate()
            .map_err(|e| AcmeError::Config(e.to_string()))?;

        let provider = CloudflareProvider::with_base(
            config.dns.api_base.as_str(),
            &config.cloudflare_token,
            config.dns.api_timeout(),
        )
        .map_err(|e| AcmeError::Config(e.to_string()))?;
        let verifier = PropagationVerifier::from_config(&config.propagation)
            .map_err(|e| AcmeError::Config(e.to_string()))?;

        let orders = OrderManager::new(
            RecordPublisher::new(Arc::new(provider)),
            Arc::new(verifier),
            OrderSettings::from_config(config),
        );
        let session = AcmeSession::new(
            config.ca.clone(),
            config.email.clone(),
            Arc::new(InstantAcmeDirectory),
            AccountStore::new(&config.paths.account_dir),
        );

        info!("🏛️ Using {} ({})", config.ca.name, config.ca.directory_url);

        Ok(Self::new(
            config.domains.clone(),
            config.schedule.clone(),
            session,
            orders,
            RenewalStore::new(config.paths.renewal_file(), config.schedule.renewal_age_days),
            CertStore::new(&config.paths.cert_dir),
        ))
    }

    pub fn session(&self) -> &AcmeSession {
        &self.session
    }

    pub fn renewals(&self) -> &RenewalStore {
        &self.renewals
    }

    pub fn certs(&self) -> &CertStore {
        &self.certs
    }

    /// 🔄 Run cycles until the process stops
    pub async fn run(&mut self) {
        let interval = self.schedule.check_interval();
        info!("🔄 Starting certificate lifecycle loop (interval: {:?})", interval);

        loop {
            let report = self.run_cycle().await;
            if !report.is_success() {
                warn!("⚠️ {} domain(s) will be retried next cycle", report.failed.len());
            }

            info!("💤 Next check in {:?}", interval);
            tokio::time::sleep(interval).await;
        }
    }

    /// 🔍 One pass over every configured domain
    pub async fn run_cycle(&mut self) -> CycleReport {
        info!("🔍 Running certificate check for {} domain(s)", self.domains.len());

        if let Err(e) = self.renewals.load().await {
            error!("❌ Failed to load renewal state, keeping what is in memory: {}", e);
        }

        let mut report = CycleReport::default();
        let domains = self.domains.clone();

        for domain in domains {
            if !self.renewals.is_eligible(&domain) {
                if let Some(next) = self.renewals.next_eligible(&domain) {
                    info!(domain = %domain, next = %next.to_rfc3339(), "⏭️ Renewed recently, skipping");
                }
                report.skipped.push(domain);
                continue;
            }

            let Some(cert) = self.issue(&domain).await else {
                report.failed.push(domain);
                continue;
            };

            if let Err(e) = self.certs.store(&cert).await {
                error!(domain = %domain, error = %e, "❌ Failed to store certificate");
                report.failed.push(domain);
                continue;
            }

            self.renewals.record_success(&domain, Utc::now());
            if let Err(e) = self.renewals.save().await {
                error!(domain = %domain, error = %e, "❌ Failed to save renewal state");
            }
            report.issued.push(domain);
        }

        info!(
            issued = report.issued.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "📊 Cycle finished"
        );
        report
    }

    /// Try up to the configured number of attempts; errors never escape
    async fn issue(&self, domain: &str) -> Option<Certificate> {
        let attempts = self.schedule.attempts_per_domain.max(1);

        for attempt in 1..=attempts {
            info!(domain = %domain, attempt, attempts, "🔐 Issuing certificate");

            match self.orders.order(&self.session, domain).await {
                Ok(cert) => return Some(cert),
                Err(e) if !e.is_retryable() => {
                    error!(domain = %domain, attempt, error = %e, "❌ Issuance cannot succeed");
                    return None;
                }
                Err(e) => {
                    warn!(domain = %domain, attempt, attempts, error = %e, "❌ Attempt failed");
                }
            }
        }

        error!(domain = %domain, attempts, "❌ Giving up until next cycle");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_success() {
        let mut report = CycleReport::default();
        report.issued.push("example.com".to_string());
        report.skipped.push("example.org".to_string());
        assert!(report.is_success());

        report.failed.push("example.net".to_string());
        assert!(!report.is_success());
    }

    #[test]
    fn test_from_config_rejects_incomplete_config() {
        let err = Orchestrator::from_config(&AppConfig::default()).err().unwrap();
        assert!(matches!(err, AcmeError::Config(_)));
        assert!(!err.is_retryable());
    }
}
