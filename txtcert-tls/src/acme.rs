//! ACME protocol seam and its instant-acme backend
//!
//! 🔐 The order state machine talks to the CA only through the
//! [`AcmeDirectory`], [`AcmeAccount`] and [`AcmeOrder`] traits. The
//! production implementation wraps `instant-acme`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, ExternalAccountKey,
    Identifier, NewAccount, NewOrder, Order, RetryPolicy,
};
use tokio::time::sleep;
use tracing::{debug, info};

use txtcert_core::config::FinalizeConfig;
use txtcert_core::{CaEndpoint, ExternalAccountBinding};

use crate::error::{AcmeError, AcmeResult};

/// Challenge status as reported by the CA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// Order status as reported by the CA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

impl OrderStatus {
    /// The CA is still working on the order after finalize
    pub fn is_in_progress(self) -> bool {
        matches!(self, OrderStatus::Ready | OrderStatus::Processing)
    }
}

/// 📡 The DNS-01 challenge of an order's first authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsChallenge {
    /// Challenge token
    pub token: String,
    /// Expected TXT value derived from the account key and token
    pub txt_value: String,
    /// Challenge resource URL
    pub url: String,
    /// Status when fetched. `Valid` when the authorization is already satisfied.
    pub status: ChallengeStatus,
}

/// Order status after a refresh, with the CA's suggested poll delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderProgress {
    pub status: OrderStatus,
    pub retry_after: Option<Duration>,
}

impl OrderProgress {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            retry_after: None,
        }
    }
}

/// Opaque serialized account credentials (key material, account URL, directory)
pub type AccountCredentialsJson = serde_json::Value;

/// Registers or restores accounts against a CA directory
#[async_trait]
pub trait AcmeDirectory: Send + Sync {
    /// Register a new account, returning it with credentials to persist
    async fn register(
        &self,
        ca: &CaEndpoint,
        email: &str,
    ) -> AcmeResult<(Arc<dyn AcmeAccount>, AccountCredentialsJson)>;

    /// Rebuild an account from persisted credentials
    async fn restore(&self, credentials: AccountCredentialsJson) -> AcmeResult<Arc<dyn AcmeAccount>>;
}

/// A registered ACME account
#[async_trait]
pub trait AcmeAccount: Send + Sync {
    /// Open an order for exactly one identifier, passed through verbatim
    async fn new_order(&self, domain: &str) -> AcmeResult<Box<dyn AcmeOrder>>;
}

/// One in-flight order
#[async_trait]
pub trait AcmeOrder: Send {
    /// Order resource URL
    fn url(&self) -> &str;

    /// DNS-01 challenge of the first authorization
    async fn dns_challenge(&mut self) -> AcmeResult<DnsChallenge>;

    /// Ask the CA to validate the challenge at `challenge_url`
    async fn submit_challenge(&mut self, challenge_url: &str) -> AcmeResult<()>;

    /// Current status of the challenge at `challenge_url`
    async fn challenge_status(&mut self, challenge_url: &str) -> AcmeResult<ChallengeStatus>;

    /// Submit a DER encoded CSR and report the order status afterwards
    async fn finalize(&mut self, csr_der: &[u8]) -> AcmeResult<OrderProgress>;

    /// Refresh the order resource
    async fn refresh(&mut self) -> AcmeResult<OrderProgress>;

    /// ⏳ Wait for the order to leave `Pending` so it can be finalized
    async fn poll_ready(&mut self, config: &FinalizeConfig) -> AcmeResult<OrderProgress> {
        let progress = self.refresh().await?;
        poll_while(self, config, progress, |status| status == OrderStatus::Pending).await
    }

    /// ⏳ Wait for a finalized order to leave `Ready` / `Processing`
    async fn poll_issued(
        &mut self,
        config: &FinalizeConfig,
        progress: OrderProgress,
    ) -> AcmeResult<OrderProgress> {
        poll_while(self, config, progress, OrderStatus::is_in_progress).await
    }

    /// PEM certificate chain, once the order is valid
    async fn certificate(&mut self) -> AcmeResult<Option<String>>;
}

/// Refresh while `waiting` holds, at most `max_polls` times, sleeping the
/// clamped retry-after (or the fallback delay) before each refresh
async fn poll_while<O: AcmeOrder + ?Sized>(
    order: &mut O,
    config: &FinalizeConfig,
    mut progress: OrderProgress,
    waiting: fn(OrderStatus) -> bool,
) -> AcmeResult<OrderProgress> {
    let mut polls = 0;
    while waiting(progress.status) && polls < config.max_polls {
        let delay = config.retry_delay(progress.retry_after);
        debug!(status = ?progress.status, ?delay, "⏳ Order not settled, checking again");
        sleep(delay).await;
        progress = order.refresh().await?;
        polls += 1;
    }
    Ok(progress)
}

/// 🏭 [`AcmeDirectory`] backed by instant-acme
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantAcmeDirectory;

#[async_trait]
impl AcmeDirectory for InstantAcmeDirectory {
    async fn register(
        &self,
        ca: &CaEndpoint,
        email: &str,
    ) -> AcmeResult<(Arc<dyn AcmeAccount>, AccountCredentialsJson)> {
        let contact = format!("mailto:{}", email);
        let eab = ca.eab.as_ref().map(external_account_key).transpose()?;

        info!(ca = %ca.name, email = %email, "👤 Registering ACME account");

        let (account, credentials) = Account::builder()
            .map_err(|e| AcmeError::Account(format!("Failed to create account builder: {}", e)))?
            .create(
                &NewAccount {
                    contact: &[&contact],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                ca.directory_url.clone(),
                eab.as_ref(),
            )
            .await
            .map_err(|e| AcmeError::Account(format!("Failed to create account: {}", e)))?;

        let credentials = serde_json::to_value(&credentials)
            .map_err(|e| AcmeError::Account(format!("Failed to serialize credentials: {}", e)))?;

        Ok((Arc::new(InstantAcmeAccount { account }), credentials))
    }

    async fn restore(&self, credentials: AccountCredentialsJson) -> AcmeResult<Arc<dyn AcmeAccount>> {
        let credentials: AccountCredentials = serde_json::from_value(credentials)
            .map_err(|e| AcmeError::Account(format!("Failed to deserialize credentials: {}", e)))?;

        let account = Account::builder()
            .map_err(|e| AcmeError::Account(format!("Failed to create account builder: {}", e)))?
            .from_credentials(credentials)
            .await
            .map_err(|e| AcmeError::Account(format!("Failed to restore account: {}", e)))?;

        Ok(Arc::new(InstantAcmeAccount { account }))
    }
}

/// Decode the base64url HMAC key of an external account binding
fn external_account_key(eab: &ExternalAccountBinding) -> AcmeResult<ExternalAccountKey> {
    let key = URL_SAFE_NO_PAD
        .decode(eab.hmac_key.trim().trim_end_matches('='))
        .map_err(|e| AcmeError::Config(format!("Invalid EAB HMAC key: {}", e)))?;
    Ok(ExternalAccountKey::new(eab.key_id.clone(), &key))
}

struct InstantAcmeAccount {
    account: Account,
}

#[async_trait]
impl AcmeAccount for InstantAcmeAccount {
    async fn new_order(&self, domain: &str) -> AcmeResult<Box<dyn AcmeOrder>> {
        let identifiers = [Identifier::Dns(domain.to_string())];
        let order = self
            .account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| AcmeError::OrderCreation {
                domain: domain.to_string(),
                message: e.to_string(),
            })?;

        debug!(domain = %domain, url = %order.url(), "📝 Order created");
        Ok(Box::new(InstantAcmeOrder { order, chain: None }))
    }
}

struct InstantAcmeOrder {
    order: Order,
    /// Chain downloaded while polling for issuance
    chain: Option<String>,
}

impl InstantAcmeOrder {
    /// Turn a polling error into a status when the order timed out or went invalid
    fn settled_or(&mut self, error: instant_acme::Error) -> AcmeResult<OrderProgress> {
        let status = map_order_status(&self.order.state().status);
        match error {
            instant_acme::Error::Timeout(_) => Ok(OrderProgress::new(status)),
            _ if status == OrderStatus::Invalid => Ok(OrderProgress::new(status)),
            e => Err(e.into()),
        }
    }
}

/// instant-acme polling policy: the fallback delay between polls, Retry-After
/// honoured by the crate, bounded by the finalize poll window
fn retry_policy(config: &FinalizeConfig) -> RetryPolicy {
    RetryPolicy::new()
        .initial_delay(config.fallback_delay())
        .backoff(1.0)
        .timeout(config.poll_window())
}

#[async_trait]
impl AcmeOrder for InstantAcmeOrder {
    fn url(&self) -> &str {
        self.order.url()
    }

    async fn dns_challenge(&mut self) -> AcmeResult<DnsChallenge> {
        let mut authorizations = self.order.authorizations();
        let mut authz = match authorizations.next().await {
            Some(result) => result?,
            None => return Err(AcmeError::Protocol("Order carries no authorizations".to_string())),
        };

        let already_valid = authz.status == AuthorizationStatus::Valid;
        let challenge = authz
            .challenge(ChallengeType::Dns01)
            .ok_or_else(|| AcmeError::Protocol("No DNS-01 challenge offered".to_string()))?;

        let status = if already_valid {
            ChallengeStatus::Valid
        } else {
            map_challenge_status(&challenge.status)
        };

        Ok(DnsChallenge {
            token: challenge.token.clone(),
            txt_value: challenge.key_authorization().dns_value(),
            url: challenge.url.clone(),
            status,
        })
    }

    async fn submit_challenge(&mut self, challenge_url: &str) -> AcmeResult<()> {
        let mut authorizations = self.order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result?;

            let matching_type = authz
                .challenges
                .iter()
                .find(|c| c.url == challenge_url)
                .map(|c| c.r#type.clone());

            if let Some(challenge_type) = matching_type {
                if let Some(mut challenge) = authz.challenge(challenge_type) {
                    challenge.set_ready().await?;
                    return Ok(());
                }
            }
        }

        Err(AcmeError::Protocol(format!("Challenge not found: {}", challenge_url)))
    }

    async fn challenge_status(&mut self, challenge_url: &str) -> AcmeResult<ChallengeStatus> {
        let mut authorizations = self.order.authorizations();
        while let Some(result) = authorizations.next().await {
            let authz = result?;
            if let Some(challenge) = authz.challenges.iter().find(|c| c.url == challenge_url) {
                return Ok(map_challenge_status(&challenge.status));
            }
        }

        Err(AcmeError::Protocol(format!("Challenge not found: {}", challenge_url)))
    }

    async fn finalize(&mut self, csr_der: &[u8]) -> AcmeResult<OrderProgress> {
        self.order.finalize_csr(csr_der).await?;
        Ok(OrderProgress::new(map_order_status(&self.order.state().status)))
    }

    async fn refresh(&mut self) -> AcmeResult<OrderProgress> {
        let state = self.order.refresh().await?;
        // Retry-After stays inside instant-acme; poll_ready / poll_issued go through its RetryPolicy
        Ok(OrderProgress::new(map_order_status(&state.status)))
    }

    async fn poll_ready(&mut self, config: &FinalizeConfig) -> AcmeResult<OrderProgress> {
        match self.order.poll_ready(&retry_policy(config)).await {
            Ok(status) => Ok(OrderProgress::new(map_order_status(&status))),
            Err(e) => self.settled_or(e),
        }
    }

    async fn poll_issued(
        &mut self,
        config: &FinalizeConfig,
        progress: OrderProgress,
    ) -> AcmeResult<OrderProgress> {
        if !progress.status.is_in_progress() {
            return Ok(progress);
        }

        match self.order.poll_certificate(&retry_policy(config)).await {
            Ok(chain) => {
                self.chain = Some(chain);
                Ok(OrderProgress::new(OrderStatus::Valid))
            }
            Err(e) => self.settled_or(e),
        }
    }

    async fn certificate(&mut self) -> AcmeResult<Option<String>> {
        if let Some(chain) = self.chain.take() {
            return Ok(Some(chain));
        }
        Ok(self.order.certificate().await?)
    }
}

#[allow(unreachable_patterns)]
fn map_challenge_status(status: &instant_acme::ChallengeStatus) -> ChallengeStatus {
    match status {
        instant_acme::ChallengeStatus::Pending => ChallengeStatus::Pending,
        instant_acme::ChallengeStatus::Processing => ChallengeStatus::Processing,
        instant_acme::ChallengeStatus::Valid => ChallengeStatus::Valid,
        instant_acme::ChallengeStatus::Invalid => ChallengeStatus::Invalid,
        _ => ChallengeStatus::Pending,
    }
}

#[allow(unreachable_patterns)]
fn map_order_status(status: &instant_acme::OrderStatus) -> OrderStatus {
    match status {
        instant_acme::OrderStatus::Pending => OrderStatus::Pending,
        instant_acme::OrderStatus::Ready => OrderStatus::Ready,
        instant_acme::OrderStatus::Processing => OrderStatus::Processing,
        instant_acme::OrderStatus::Valid => OrderStatus::Valid,
        instant_acme::OrderStatus::Invalid => OrderStatus::Invalid,
        _ => OrderStatus::Processing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Order whose refreshes replay a script, then repeat `after`
    struct ScriptedOrder {
        script: VecDeque<OrderProgress>,
        after: OrderStatus,
        refreshes: u32,
    }

    impl ScriptedOrder {
        fn new(script: &[OrderProgress], after: OrderStatus) -> Self {
            Self {
                script: script.iter().copied().collect(),
                after,
                refreshes: 0,
            }
        }
    }

    #[async_trait]
    impl AcmeOrder for ScriptedOrder {
        fn url(&self) -> &str {
            "https://ca.test/order/1"
        }

        async fn dns_challenge(&mut self) -> AcmeResult<DnsChallenge> {
            Err(AcmeError::Protocol("unused".to_string()))
        }

        async fn submit_challenge(&mut self, _challenge_url: &str) -> AcmeResult<()> {
            Ok(())
        }

        async fn challenge_status(&mut self, _challenge_url: &str) -> AcmeResult<ChallengeStatus> {
            Ok(ChallengeStatus::Valid)
        }

        async fn finalize(&mut self, _csr_der: &[u8]) -> AcmeResult<OrderProgress> {
            Ok(OrderProgress::new(OrderStatus::Processing))
        }

        async fn refresh(&mut self) -> AcmeResult<OrderProgress> {
            self.refreshes += 1;
            Ok(self
                .script
                .pop_front()
                .unwrap_or(OrderProgress::new(self.after)))
        }

        async fn certificate(&mut self) -> AcmeResult<Option<String>> {
            Ok(None)
        }
    }

    fn quick_finalize(max_polls: u32) -> FinalizeConfig {
        FinalizeConfig {
            max_polls,
            fallback_delay_secs: 0,
            min_retry_after_secs: 1,
            max_retry_after_secs: 60,
        }
    }

    #[tokio::test]
    async fn test_poll_ready_waits_out_pending() {
        let pending = OrderProgress::new(OrderStatus::Pending);
        let mut order = ScriptedOrder::new(&[pending, pending], OrderStatus::Ready);

        let progress = order.poll_ready(&quick_finalize(10)).await.unwrap();
        assert_eq!(progress.status, OrderStatus::Ready);
        assert_eq!(order.refreshes, 3);
    }

    #[tokio::test]
    async fn test_poll_issued_stops_after_max_polls() {
        let mut order = ScriptedOrder::new(&[], OrderStatus::Processing);

        let progress = order
            .poll_issued(&quick_finalize(4), OrderProgress::new(OrderStatus::Processing))
            .await
            .unwrap();
        assert_eq!(progress.status, OrderStatus::Processing);
        assert_eq!(order.refreshes, 4);
    }

    #[tokio::test]
    async fn test_poll_issued_honours_retry_after() {
        let mut order = ScriptedOrder::new(&[], OrderStatus::Valid);
        let processing = OrderProgress {
            status: OrderStatus::Processing,
            retry_after: Some(Duration::from_secs(1)),
        };

        let started = std::time::Instant::now();
        let progress = order.poll_issued(&quick_finalize(10), processing).await.unwrap();

        assert_eq!(progress.status, OrderStatus::Valid);
        assert_eq!(order.refreshes, 1);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_settled_order_is_not_polled() {
        let mut order = ScriptedOrder::new(&[], OrderStatus::Processing);

        let progress = order
            .poll_issued(&quick_finalize(10), OrderProgress::new(OrderStatus::Valid))
            .await
            .unwrap();
        assert_eq!(progress.status, OrderStatus::Valid);
        assert_eq!(order.refreshes, 0);
    }

    #[test]
    fn test_in_progress_statuses() {
        assert!(OrderStatus::Processing.is_in_progress());
        assert!(OrderStatus::Ready.is_in_progress());
        assert!(!OrderStatus::Valid.is_in_progress());
        assert!(!OrderStatus::Invalid.is_in_progress());
        assert!(!OrderStatus::Pending.is_in_progress());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            map_challenge_status(&instant_acme::ChallengeStatus::Invalid),
            ChallengeStatus::Invalid
        );
        assert_eq!(
            map_order_status(&instant_acme::OrderStatus::Valid),
            OrderStatus::Valid
        );
    }

    #[test]
    fn test_eab_key_decoding() {
        let eab = ExternalAccountBinding {
            key_id: "kid-1".to_string(),
            hmac_key: URL_SAFE_NO_PAD.encode(b"0123456789abcdef0123456789abcdef"),
        };
        assert!(external_account_key(&eab).is_ok());

        let padded = ExternalAccountBinding {
            key_id: "kid-1".to_string(),
            hmac_key: format!("{}==", URL_SAFE_NO_PAD.encode(b"0123")),
        };
        assert!(external_account_key(&padded).is_ok());
    }

    #[test]
    fn test_eab_key_rejects_garbage() {
        let eab = ExternalAccountBinding {
            key_id: "kid-1".to_string(),
            hmac_key: "not base64 !!".to_string(),
        };
        assert!(matches!(external_account_key(&eab), Err(AcmeError::Config(_))));
    }
}
