//! Background renewal of the access token ahead of its expiry.
//!
//! The renewer watches the stored credential and calls
//! [`IdentityProvider::renew_token`] `lead` before the access token expires.
//! A failed renewal is not retried for the same credential; the gateway's
//! renew-on-401 path takes over from there.

use crate::client::{IdentityProvider, OidcClient};
use crate::store::StoredCredential;
use chrono::{DateTime, Utc};
use mealplan_core::settings::DEFAULT_RENEW_LEAD;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often an idle renewer re-reads the stored credential.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum pause between two renewal attempts.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(5);

/// Timing of automatic renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoRenew {
    /// Renew this long before the access token expires.
    pub lead: Duration,
    /// Re-check interval while there is nothing to renew.
    pub poll_interval: Duration,
    /// Floor on the wait before any renewal attempt.
    pub min_interval: Duration,
}

impl Default for AutoRenew {
    fn default() -> Self {
        Self {
            lead: DEFAULT_RENEW_LEAD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

/// What the renewer does next.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    /// Renew the credential holding this access token after the wait.
    Renew(Duration, String),
    /// Read the credential again after the wait.
    Recheck(Duration),
}

impl AutoRenew {
    /// Renew `lead` before expiry.
    pub fn new(lead: Duration) -> Self {
        Self {
            lead,
            ..Default::default()
        }
    }

    /// Override the idle re-check interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the minimum pause between attempts.
    #[must_use]
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Run the renewer on the current runtime until `cancel` fires.
    pub fn spawn(self, provider: Arc<dyn IdentityProvider>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(provider, cancel))
    }

    /// Drive renewal until `cancel` fires.
    pub async fn run(self, provider: Arc<dyn IdentityProvider>, cancel: CancellationToken) {
        debug!(lead_secs = self.lead.as_secs(), "Automatic renewal started");
        let mut failed: Option<String> = None;

        loop {
            let credential = provider.get_user().await;
            let next = self.plan(credential.as_ref(), failed.as_deref(), Utc::now());

            let (wait, token) = match next {
                Next::Renew(wait, token) => (wait, Some(token)),
                Next::Recheck(wait) => (wait, None),
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
            let Some(token) = token else {
                continue;
            };

            // Someone else may have renewed while we slept.
            let current = provider.get_user().await;
            if current.as_ref().map(|c| c.access_token.as_str()) != Some(token.as_str()) {
                continue;
            }

            match provider.renew_token().await {
                Ok(_) => {
                    info!("Access token renewed ahead of expiry");
                    failed = None;
                }
                Err(e) => {
                    warn!(error = %e, "Automatic renewal failed");
                    failed = Some(token);
                }
            }
        }
        debug!("Automatic renewal stopped");
    }

    fn plan(&self, credential: Option<&StoredCredential>, failed: Option<&str>, now: DateTime<Utc>) -> Next {
        let Some(credential) = credential else {
            return Next::Recheck(self.poll_interval);
        };
        let renewable = credential.refresh_token.is_some() && failed != Some(credential.access_token.as_str());
        match credential.expires_at {
            Some(expires_at) if renewable => {
                let until_expiry = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
                let wait = until_expiry.saturating_sub(self.lead).max(self.min_interval);
                Next::Renew(wait, credential.access_token.clone())
            }
            _ => Next::Recheck(self.poll_interval),
        }
    }
}

impl OidcClient {
    /// Start background renewal as configured, or `None` when it is disabled.
    ///
    /// The task runs until `cancel` fires.
    pub fn spawn_auto_renew(self: Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config().automatic_silent_renew {
            return None;
        }
        let renew = AutoRenew::new(self.config().renew_lead);
        Some(renew.spawn(self, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::IdTokenClaims;
    use crate::client::AuthenticatedUser;
    use async_trait::async_trait;
    use mealplan_core::errors::{AuthError, CallbackError, SilentRenewError};
    use mealplan_core::IdentityProviderHint;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LIFETIME: i64 = 600;

    fn credential(token: &str, refresh: bool) -> StoredCredential {
        StoredCredential {
            access_token: token.into(),
            token_type: "Bearer".into(),
            id_token: "h.p.s".into(),
            refresh_token: refresh.then(|| "refresh".to_string()),
            scope: None,
            expires_at: Some(Utc::now() + chrono::Duration::seconds(LIFETIME)),
            profile: IdTokenClaims {
                sub: "user123".into(),
                ..Default::default()
            },
        }
    }

    /// Provider whose renewals either hand out a fresh credential or fail.
    #[derive(Default)]
    struct RenewingProvider {
        credential: Mutex<Option<StoredCredential>>,
        renewals: AtomicUsize,
        reject: bool,
    }

    impl RenewingProvider {
        fn signed_in(reject: bool) -> Arc<Self> {
            Arc::new(Self {
                credential: Mutex::new(Some(credential("access-0", true))),
                renewals: AtomicUsize::new(0),
                reject,
            })
        }

        fn renewals(&self) -> usize {
            self.renewals.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityProvider for RenewingProvider {
        async fn login_with_return(
            &self,
            _hint: Option<IdentityProviderHint>,
            _return_to: Option<String>,
        ) -> Result<(), AuthError> {
            Ok(())
        }

        async fn handle_login_callback(&self, _callback_url: &str) -> Result<AuthenticatedUser, CallbackError> {
            Err(CallbackError::MissingCode)
        }

        async fn get_user(&self) -> Option<StoredCredential> {
            self.credential.lock().clone()
        }

        async fn renew_token(&self) -> Result<StoredCredential, SilentRenewError> {
            let n = self.renewals.fetch_add(1, Ordering::SeqCst) + 1;
            if self.reject {
                return Err(SilentRenewError::Rejected {
                    status: 400,
                    body: "invalid_grant".into(),
                });
            }
            let renewed = credential(&format!("access-{n}"), true);
            *self.credential.lock() = Some(renewed.clone());
            Ok(renewed)
        }

        async fn logout(&self) -> Result<(), AuthError> {
            *self.credential.lock() = None;
            Ok(())
        }

        async fn is_authenticated(&self) -> Result<bool, AuthError> {
            Ok(self.credential.lock().is_some())
        }
    }

    fn lead() -> Duration {
        Duration::from_secs(60)
    }

    #[test]
    fn test_plan_waits_until_lead_before_expiry() {
        let renew = AutoRenew::new(lead());
        let now = Utc::now();
        let mut cred = credential("access", true);
        cred.expires_at = Some(now + chrono::Duration::seconds(600));

        assert_eq!(
            renew.plan(Some(&cred), None, now),
            Next::Renew(Duration::from_secs(540), "access".into())
        );
    }

    #[test]
    fn test_plan_floors_overdue_renewal() {
        let renew = AutoRenew::new(lead());
        let now = Utc::now();
        let mut cred = credential("access", true);
        cred.expires_at = Some(now - chrono::Duration::seconds(5));

        assert_eq!(
            renew.plan(Some(&cred), None, now),
            Next::Renew(DEFAULT_MIN_INTERVAL, "access".into())
        );
    }

    #[test]
    fn test_plan_rechecks_when_nothing_to_renew() {
        let renew = AutoRenew::new(lead());
        let now = Utc::now();
        let idle = Next::Recheck(DEFAULT_POLL_INTERVAL);

        assert_eq!(renew.plan(None, None, now), idle);
        assert_eq!(renew.plan(Some(&credential("access", false)), None, now), idle);
        assert_eq!(renew.plan(Some(&credential("access", true)), Some("access"), now), idle);

        let mut no_expiry = credential("access", true);
        no_expiry.expires_at = None;
        assert_eq!(renew.plan(Some(&no_expiry), None, now), idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renews_before_each_expiry() {
        let provider = RenewingProvider::signed_in(false);
        let cancel = CancellationToken::new();
        let handle = AutoRenew::new(lead()).spawn(provider.clone(), cancel.clone());

        tokio::time::sleep(Duration::from_secs(500)).await;
        assert_eq!(provider.renewals(), 0);

        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(provider.renewals(), 1);
        assert_eq!(provider.get_user().await.unwrap().access_token, "access-1");

        tokio::time::sleep(Duration::from_secs(540)).await;
        assert_eq!(provider.renewals(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_renewal_not_repeated() {
        let provider = RenewingProvider::signed_in(true);
        let cancel = CancellationToken::new();
        let handle = AutoRenew::new(lead()).spawn(provider.clone(), cancel.clone());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(provider.renewals(), 1);
        assert_eq!(provider.get_user().await.unwrap().access_token, "access-0");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_spawn_follows_config() {
        use crate::navigator::RecordingNavigator;
        use crate::store::MemoryStore;
        use mealplan_core::AuthConfig;

        let client = |enabled: bool| {
            let config = AuthConfig::new(
                "https://idp.example.com".parse().unwrap(),
                "meal-client",
                "https://app.example.com/auth/callback".parse().unwrap(),
            )
            .with_automatic_silent_renew(enabled, lead());
            Arc::new(
                OidcClient::new(config, Arc::new(MemoryStore::new()), Arc::new(RecordingNavigator::new()))
                    .unwrap(),
            )
        };

        assert!(client(false).spawn_auto_renew(CancellationToken::new()).is_none());

        let cancel = CancellationToken::new();
        let handle = client(true).spawn_auto_renew(cancel.clone()).unwrap();
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_idle_renewer() {
        let provider = Arc::new(RenewingProvider::default());
        let cancel = CancellationToken::new();
        let handle = AutoRenew::default()
            .with_poll_interval(Duration::from_secs(10))
            .with_min_interval(Duration::from_secs(1))
            .spawn(provider.clone(), cancel.clone());

        tokio::time::sleep(Duration::from_secs(120)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(provider.renewals(), 0);
    }
}
