//! Identity provider client.
//!
//! [`IdentityProvider`] is the seam the session synchronizer, request gateway
//! and route guard depend on; [`OidcClient`] implements it against a real
//! OIDC authority.

use crate::claims::{decode_id_token, map_claims_to_profile, merge_userinfo};
use crate::discovery::{Endpoints, MetadataResolver};
use crate::flow::{self, TokenRequestError, TokenResponse};
use crate::navigator::Navigator;
use crate::pkce::PkceSecrets;
use crate::store::{KeyValueStore, PendingAuthorization, StoredCredential, TokenStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mealplan_core::errors::{
    AuthError, CallbackError, ClaimsError, ConfigError, SilentRenewError, StorageError,
};
use mealplan_core::{AuthConfig, IdentityProviderHint, UserProfile};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Where a client is in the sign-in lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthPhase {
    /// No credential.
    Anonymous,
    /// `login` navigated away; waiting for the callback.
    PendingRedirect,
    /// A credential is held.
    Authenticated,
}

/// Result of a completed sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    /// The persisted credential.
    pub credential: StoredCredential,
    /// The validated user projection.
    pub profile: UserProfile,
    /// Location recorded by [`IdentityProvider::login_with_return`].
    pub return_to: Option<String>,
}

/// Operations on the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start an interactive sign-in and navigate to the authority.
    async fn login(&self, hint: Option<IdentityProviderHint>) -> Result<(), AuthError> {
        self.login_with_return(hint, None).await
    }

    /// As [`login`](Self::login), recording where to return afterwards.
    async fn login_with_return(
        &self,
        hint: Option<IdentityProviderHint>,
        return_to: Option<String>,
    ) -> Result<(), AuthError>;

    /// Complete the sign-in from the URL the authority redirected to.
    async fn handle_login_callback(&self, callback_url: &str) -> Result<AuthenticatedUser, CallbackError>;

    /// The current credential, if present and not expired.
    ///
    /// Never fails; storage problems read as "no session".
    async fn get_user(&self) -> Option<StoredCredential>;

    /// Renew the credential without user interaction.
    ///
    /// The stored credential is left in place on failure.
    async fn renew_token(&self) -> Result<StoredCredential, SilentRenewError>;

    /// Forget the local credential and navigate to the authority's sign-out.
    async fn logout(&self) -> Result<(), AuthError>;

    /// Whether a non-expired credential is stored. Reads storage every call.
    async fn is_authenticated(&self) -> Result<bool, AuthError>;

    /// Project a credential into the application user.
    fn map_user(&self, credential: &StoredCredential) -> Result<UserProfile, ClaimsError> {
        map_claims_to_profile(&credential.profile)
    }
}

/// Failure turning a token response into a credential.
enum CredentialError {
    Claims(ClaimsError),
    NonceMismatch,
    Request(TokenRequestError),
}

impl From<ClaimsError> for CredentialError {
    fn from(err: ClaimsError) -> Self {
        Self::Claims(err)
    }
}

impl From<TokenRequestError> for CredentialError {
    fn from(err: TokenRequestError) -> Self {
        Self::Request(err)
    }
}

impl From<CredentialError> for CallbackError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Claims(e) => Self::Claims(e),
            CredentialError::NonceMismatch => Self::NonceMismatch,
            CredentialError::Request(e) => e.into(),
        }
    }
}

impl From<CredentialError> for SilentRenewError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Claims(e) => Self::Claims(e),
            CredentialError::NonceMismatch => Self::Claims(ClaimsError::Malformed("unexpected nonce".into())),
            CredentialError::Request(e) => e.into(),
        }
    }
}

/// OIDC authorization-code + PKCE client.
pub struct OidcClient {
    config: AuthConfig,
    http: reqwest::Client,
    store: TokenStore,
    metadata: MetadataResolver,
    navigator: Arc<dyn Navigator>,
    phase: Mutex<AuthPhase>,
}

impl std::fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcClient")
            .field("authority", &self.config.authority.as_str())
            .field("client_id", &self.config.client_id)
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

impl OidcClient {
    /// Create a client persisting into `storage`.
    pub fn new(
        config: AuthConfig,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ConfigError> {
        let metadata = MetadataResolver::new(&config)?;
        let store = TokenStore::new(storage, config.storage_key());
        Ok(Self {
            config,
            http: reqwest::Client::new(),
            store,
            metadata,
            navigator,
            phase: Mutex::new(AuthPhase::Anonymous),
        })
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The underlying token store.
    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Current lifecycle phase, for diagnostics.
    pub fn phase(&self) -> AuthPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: AuthPhase) {
        *self.phase.lock() = phase;
    }

    async fn endpoints(&self) -> Result<&Endpoints, mealplan_core::DiscoveryError> {
        self.metadata.endpoints(&self.http).await
    }

    /// Turn a token response into a validated credential.
    ///
    /// `previous` supplies the refresh token, ID token and claims when a
    /// renewal response omits them.
    async fn build_credential(
        &self,
        endpoints: &Endpoints,
        tokens: TokenResponse,
        previous: Option<&StoredCredential>,
        expected_nonce: Option<&str>,
    ) -> Result<(StoredCredential, UserProfile), CredentialError> {
        let (id_token, profile) = match (tokens.id_token, previous) {
            (Some(id_token), previous) => {
                let claims = decode_id_token(&id_token)?;
                if let Some(expected) = expected_nonce {
                    if claims.nonce.as_deref() != Some(expected) {
                        return Err(CredentialError::NonceMismatch);
                    }
                }
                if let Some(previous) = previous {
                    if previous.profile.sub != claims.sub {
                        return Err(ClaimsError::SubjectMismatch.into());
                    }
                }
                let claims = match (&endpoints.userinfo, self.config.load_user_info) {
                    (Some(userinfo), true) => {
                        let raw = flow::fetch_userinfo(&self.http, userinfo, &tokens.access_token).await?;
                        merge_userinfo(claims, raw)?
                    }
                    _ => claims,
                };
                (id_token, claims)
            }
            (None, Some(previous)) => (previous.id_token.clone(), previous.profile.clone()),
            (None, None) => return Err(ClaimsError::Missing("id_token").into()),
        };

        let user = map_claims_to_profile(&profile)?;
        let expires_at = tokens.expires_in.and_then(expiry_after);

        let credential = StoredCredential {
            access_token: tokens.access_token,
            token_type: tokens.token_type,
            id_token,
            refresh_token: tokens
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            scope: tokens.scope.or_else(|| previous.and_then(|p| p.scope.clone())),
            expires_at,
            profile,
        };
        Ok((credential, user))
    }

    async fn complete_callback(&self, callback_url: &str) -> Result<AuthenticatedUser, CallbackError> {
        let url = Url::parse(callback_url).map_err(|e| CallbackError::InvalidUrl(e.to_string()))?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            self.discard_pending(state.as_deref()).await;
            return Err(CallbackError::Authority {
                error,
                description: description.unwrap_or_default(),
            });
        }
        let Some(code) = code.filter(|c| !c.is_empty()) else {
            self.discard_pending(state.as_deref()).await;
            return Err(CallbackError::MissingCode);
        };
        let state = state.filter(|s| !s.is_empty()).ok_or(CallbackError::MissingState)?;

        let pending = self
            .store
            .take_pending(&state)
            .await?
            .ok_or_else(|| CallbackError::UnknownState(state.clone()))?;
        if pending.is_stale(Utc::now(), self.config.pending_ttl) {
            return Err(CallbackError::Expired);
        }

        let endpoints = self
            .endpoints()
            .await
            .map_err(|e| CallbackError::Network(e.to_string()))?;
        let tokens = flow::exchange_code(
            &self.http,
            &endpoints.token,
            &self.config,
            &code,
            &pending.redirect_uri,
            &pending.code_verifier,
        )
        .await?;

        let (credential, profile) = self
            .build_credential(endpoints, tokens, None, Some(&pending.nonce))
            .await?;
        self.store.save_credential(&credential).await?;

        Ok(AuthenticatedUser {
            credential,
            profile,
            return_to: pending.return_to,
        })
    }

    async fn discard_pending(&self, state: Option<&str>) {
        if let Some(state) = state {
            if let Err(e) = self.store.take_pending(state).await {
                debug!(error = %e, "Failed to discard pending authorization");
            }
        }
    }

    async fn refresh_credential(&self) -> Result<StoredCredential, SilentRenewError> {
        let previous = self
            .store
            .load_credential()
            .await?
            .ok_or(SilentRenewError::NoSession)?;
        let refresh_token = previous
            .refresh_token
            .as_deref()
            .ok_or(SilentRenewError::NoRefreshToken)?;

        let endpoints = self
            .endpoints()
            .await
            .map_err(|e| SilentRenewError::Network(e.to_string()))?;
        let tokens = flow::refresh(&self.http, &endpoints.token, &self.config, refresh_token).await?;

        let (credential, _) = self
            .build_credential(endpoints, tokens, Some(&previous), None)
            .await?;
        self.store.save_credential(&credential).await?;
        Ok(credential)
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    async fn login_with_return(
        &self,
        hint: Option<IdentityProviderHint>,
        return_to: Option<String>,
    ) -> Result<(), AuthError> {
        let endpoints = self.endpoints().await?;

        match self.store.prune_pending(self.config.pending_ttl).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Pruned stale pending authorizations"),
            Err(e) => warn!(error = %e, "Failed to prune pending authorizations"),
        }

        let secrets = PkceSecrets::generate();
        let pending = PendingAuthorization {
            state: secrets.state.clone(),
            nonce: secrets.nonce.clone(),
            code_verifier: secrets.code_verifier.clone(),
            redirect_uri: self.config.redirect_uri.clone(),
            created_at: Utc::now(),
            return_to,
        };
        self.store.save_pending(&pending).await?;

        let url = flow::authorization_url(&endpoints.authorization, &self.config, &secrets, hint.as_ref());
        info!(
            provider = hint.as_ref().map(IdentityProviderHint::as_str).unwrap_or("default"),
            "Redirecting to authority for sign-in"
        );
        self.set_phase(AuthPhase::PendingRedirect);
        self.navigator.navigate(url);
        Ok(())
    }

    async fn handle_login_callback(&self, callback_url: &str) -> Result<AuthenticatedUser, CallbackError> {
        match self.complete_callback(callback_url).await {
            Ok(user) => {
                info!(subject = %user.profile.id, "Sign-in completed");
                self.set_phase(AuthPhase::Authenticated);
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Sign-in callback failed");
                self.set_phase(AuthPhase::Anonymous);
                Err(e)
            }
        }
    }

    async fn get_user(&self) -> Option<StoredCredential> {
        match self.store.load_credential().await {
            Ok(Some(credential)) if credential.is_expired(Utc::now(), self.config.clock_skew) => {
                debug!("Stored credential has expired");
                None
            }
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                None
            }
        }
    }

    async fn renew_token(&self) -> Result<StoredCredential, SilentRenewError> {
        match self.refresh_credential().await {
            Ok(credential) => {
                info!(subject = %credential.profile.sub, "Silent renewal succeeded");
                self.set_phase(AuthPhase::Authenticated);
                Ok(credential)
            }
            Err(e) => {
                warn!(error = %e, "Silent renewal failed");
                self.set_phase(AuthPhase::Anonymous);
                Err(e)
            }
        }
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let id_token = match self.store.load_credential().await {
            Ok(credential) => credential.map(|c| c.id_token),
            Err(_) => None,
        };
        let cleared: Result<(), StorageError> = self.store.clear_credential().await;

        let target = match self.endpoints().await {
            Ok(Endpoints {
                end_session: Some(end_session),
                ..
            }) => flow::end_session_url(end_session, &self.config, id_token.as_deref()),
            Ok(_) => self.config.post_logout_redirect_uri.clone(),
            Err(e) => {
                warn!(error = %e, "Provider metadata unavailable; skipping end-session");
                self.config.post_logout_redirect_uri.clone()
            }
        };

        info!("Signing out");
        self.set_phase(AuthPhase::Anonymous);
        self.navigator.navigate(target);
        cleared.map_err(AuthError::from)
    }

    async fn is_authenticated(&self) -> Result<bool, AuthError> {
        let credential = self.store.load_credential().await?;
        Ok(credential.is_some_and(|c| !c.is_expired(Utc::now(), self.config.clock_skew)))
    }
}

/// Absolute expiry `secs` from now, or `None` when it is out of range.
fn expiry_after(secs: u64) -> Option<DateTime<Utc>> {
    let expires_at = i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
    if expires_at.is_none() {
        warn!(expires_in = secs, "Token lifetime out of range; treating it as non-expiring");
    }
    expires_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::IdTokenClaims;
    use crate::navigator::RecordingNavigator;
    use crate::store::MemoryStore;
    use mealplan_core::ProviderMetadata;

    fn config() -> AuthConfig {
        AuthConfig::new(
            "https://idp.example.com".parse().unwrap(),
            "meal-client",
            "https://app.example.com/auth/callback".parse().unwrap(),
        )
        .with_metadata(ProviderMetadata {
            authorization_endpoint: Some("https://idp.example.com/authorize".parse().unwrap()),
            token_endpoint: Some("https://idp.example.com/token".parse().unwrap()),
            ..Default::default()
        })
    }

    fn credential(expires_in: i64) -> StoredCredential {
        StoredCredential {
            access_token: "access".into(),
            token_type: "Bearer".into(),
            id_token: "h.p.s".into(),
            refresh_token: None,
            scope: None,
            expires_at: Some(Utc::now() + chrono::Duration::seconds(expires_in)),
            profile: IdTokenClaims {
                sub: "user123".into(),
                email: Some("user@example.com".into()),
                ..Default::default()
            },
        }
    }

    fn client() -> (OidcClient, Arc<MemoryStore>, Arc<RecordingNavigator>) {
        let storage = Arc::new(MemoryStore::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let client = OidcClient::new(config(), storage.clone(), navigator.clone()).unwrap();
        (client, storage, navigator)
    }

    #[tokio::test]
    async fn test_get_user_none_when_empty() {
        let (client, _, _) = client();
        assert!(client.get_user().await.is_none());
        assert!(!client.is_authenticated().await.unwrap());
        assert_eq!(client.phase(), AuthPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_get_user_respects_expiry() {
        let (client, _, _) = client();
        client.token_store().save_credential(&credential(-5)).await.unwrap();
        assert!(client.get_user().await.is_none());
        assert!(!client.is_authenticated().await.unwrap());

        client.token_store().save_credential(&credential(300)).await.unwrap();
        assert!(client.get_user().await.is_some());
        assert!(client.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn test_clock_skew_grace() {
        let storage = Arc::new(MemoryStore::new());
        let client = OidcClient::new(
            config().with_clock_skew(std::time::Duration::from_secs(60)),
            storage,
            Arc::new(RecordingNavigator::new()),
        )
        .unwrap();
        client.token_store().save_credential(&credential(-5)).await.unwrap();
        assert!(client.get_user().await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_storage_reads_as_anonymous() {
        let (client, storage, _) = client();
        storage
            .set(&client.config().storage_key(), "garbage".into())
            .await
            .unwrap();

        assert!(client.get_user().await.is_none());
        assert!(matches!(
            client.is_authenticated().await,
            Err(AuthError::Storage(StorageError::Corrupt { .. }))
        ));
    }

    #[tokio::test]
    async fn test_login_records_pending_and_navigates() {
        let (client, storage, navigator) = client();
        client
            .login_with_return(Some(IdentityProviderHint::Microsoft), Some("/meals".into()))
            .await
            .unwrap();

        let url = navigator.last().unwrap();
        assert_eq!(url.path(), "/authorize");
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "identity_provider" && v == "microsoft"));

        assert!(storage.get(&format!("oidc.pending.{state}")).await.unwrap().is_some());
        assert_eq!(client.phase(), AuthPhase::PendingRedirect);
    }

    #[tokio::test]
    async fn test_callback_rejects_before_network() {
        let (client, _, _) = client();

        let err = client
            .handle_login_callback("https://app.example.com/auth/callback?state=abc")
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::MissingCode));

        let err = client
            .handle_login_callback("https://app.example.com/auth/callback?code=xyz")
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::MissingState));

        let err = client
            .handle_login_callback("https://app.example.com/auth/callback?code=xyz&state=nope")
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::UnknownState(ref s) if s == "nope"));

        let err = client
            .handle_login_callback(
                "https://app.example.com/auth/callback?error=access_denied&error_description=User+cancelled",
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CallbackError::Authority { ref error, ref description }
                if error == "access_denied" && description == "User cancelled"
        ));

        let err = client.handle_login_callback("not a url").await.unwrap_err();
        assert!(matches!(err, CallbackError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_callback_state_cannot_reach_credential() {
        let (client, _, _) = client();
        client.token_store().save_credential(&credential(300)).await.unwrap();
        let key = client.config().storage_key();
        let suffix = key.trim_start_matches("oidc.");

        for state in [suffix, key.as_str()] {
            let err = client
                .handle_login_callback(&format!(
                    "https://app.example.com/auth/callback?code=x&state={state}"
                ))
                .await
                .unwrap_err();
            assert!(matches!(err, CallbackError::UnknownState(_)));
        }
        assert!(client.get_user().await.is_some());
    }

    #[tokio::test]
    async fn test_stale_pending_rejected() {
        let (client, _, _) = client();
        client
            .token_store()
            .save_pending(&PendingAuthorization {
                state: "old".into(),
                nonce: "n".into(),
                code_verifier: "v".into(),
                redirect_uri: "https://app.example.com/auth/callback".parse().unwrap(),
                created_at: Utc::now() - chrono::Duration::minutes(11),
                return_to: None,
            })
            .await
            .unwrap();

        let err = client
            .handle_login_callback("https://app.example.com/auth/callback?code=c&state=old")
            .await
            .unwrap_err();
        assert!(matches!(err, CallbackError::Expired));
    }

    #[tokio::test]
    async fn test_renew_without_session() {
        let (client, _, _) = client();
        assert!(matches!(
            client.renew_token().await,
            Err(SilentRenewError::NoSession)
        ));

        client.token_store().save_credential(&credential(300)).await.unwrap();
        assert!(matches!(
            client.renew_token().await,
            Err(SilentRenewError::NoRefreshToken)
        ));
        assert!(client.get_user().await.is_some());
    }

    #[tokio::test]
    async fn test_logout_without_end_session_goes_home() {
        let (client, _, navigator) = client();
        client.token_store().save_credential(&credential(300)).await.unwrap();

        client.logout().await.unwrap();

        assert!(client.get_user().await.is_none());
        assert_eq!(navigator.last().unwrap().as_str(), "https://app.example.com/");
    }

    #[test]
    fn test_expiry_after_out_of_range() {
        let expires_at = expiry_after(3600).unwrap();
        assert!(expires_at > Utc::now() + chrono::Duration::seconds(3500));

        assert_eq!(expiry_after(10_000_000_000_000), None);
        assert_eq!(expiry_after(i64::MAX as u64), None);
        assert_eq!(expiry_after(u64::MAX), None);
    }

    #[tokio::test]
    async fn test_map_user_default() {
        let (client, _, _) = client();
        let profile = client.map_user(&credential(300)).unwrap();
        assert_eq!(profile.username, "user@example.com");
    }
}
