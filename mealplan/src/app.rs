//! Application wiring.
//!
//! [`MealPlanApp`] owns one identity provider, one session synchronizer
//! and one authenticated backend client, all sharing the same credential.

use mealplan_auth::{
    AuthenticatedUser, AutoRenew, FileStore, IdentityProvider, KeyValueStore, Navigator, OidcClient,
    RouteGuard, SessionSynchronizer,
};
use mealplan_core::errors::{AuthError, CallbackError, ConfigError};
use mealplan_core::{ApiConfig, AuthConfig, IdentityProviderHint, Session};
use mealplan_gateway::{AuthenticatedClient, GatewayError, MealApi};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Failures while assembling the application.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The backend client could not be built.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// The signed-in application: sign-in, session state, guards, and the API.
#[derive(Clone)]
pub struct MealPlanApp {
    provider: Arc<dyn IdentityProvider>,
    session: Arc<SessionSynchronizer>,
    api: MealApi,
    auto_renew: Option<AutoRenew>,
}

impl std::fmt::Debug for MealPlanApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MealPlanApp")
            .field("session", &self.session.snapshot())
            .field("api", &self.api)
            .field("auto_renew", &self.auto_renew)
            .finish_non_exhaustive()
    }
}

impl MealPlanApp {
    /// Wire an OIDC client over `storage` to the backend at `api`.
    pub fn new(
        auth: AuthConfig,
        api: ApiConfig,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, AppError> {
        let auto_renew = auth.automatic_silent_renew.then(|| AutoRenew::new(auth.renew_lead));
        let provider = OidcClient::new(auth, storage, navigator)?;
        Ok(Self {
            auto_renew,
            ..Self::with_provider(Arc::new(provider), api)?
        })
    }

    /// Wire any identity provider to the backend at `api`.
    ///
    /// Automatic renewal is off; enable it with [`with_auto_renew`](Self::with_auto_renew).
    pub fn with_provider(provider: Arc<dyn IdentityProvider>, api: ApiConfig) -> Result<Self, AppError> {
        let session = Arc::new(SessionSynchronizer::new(provider.clone()));
        let client = AuthenticatedClient::new(api, provider.clone())?.with_session(session.clone());
        Ok(Self {
            provider,
            session,
            api: MealApi::new(Arc::new(client)),
            auto_renew: None,
        })
    }

    /// Renew tokens in the background on the given schedule.
    #[must_use]
    pub fn with_auto_renew(mut self, renew: AutoRenew) -> Self {
        self.auto_renew = Some(renew);
        self
    }

    /// Configure from the environment, keeping credentials under `storage_dir`.
    ///
    /// See [`AuthConfig::from_env`] and [`ApiConfig::from_env`] for the
    /// variables read.
    pub fn from_env(storage_dir: impl Into<PathBuf>, navigator: Arc<dyn Navigator>) -> Result<Self, AppError> {
        let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(storage_dir));
        Self::new(AuthConfig::from_env()?, ApiConfig::from_env()?, storage, navigator)
    }

    /// The identity provider.
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// The session synchronizer.
    pub fn session(&self) -> &Arc<SessionSynchronizer> {
        &self.session
    }

    /// Typed backend endpoints.
    pub fn api(&self) -> &MealApi {
        &self.api
    }

    /// A fresh guard for one protected view.
    pub fn guard(&self) -> RouteGuard {
        self.session.guard()
    }

    /// Restore any stored session. Call once at start-up.
    pub async fn boot(&self) -> Session {
        let session = self.session.boot().await;
        info!(authenticated = session.is_authenticated, "Application booted");
        session
    }

    /// Start background renewal ahead of token expiry, if enabled.
    ///
    /// Runs until `cancel` fires.
    pub fn spawn_auto_renew(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        self.auto_renew
            .map(|renew| renew.spawn(Arc::clone(&self.provider), cancel))
    }

    /// Start interactive sign-in.
    pub async fn login(&self, hint: Option<IdentityProviderHint>) -> Result<(), AuthError> {
        self.provider.login(hint).await
    }

    /// Start interactive sign-in, returning to `return_to` afterwards.
    pub async fn login_with_return(
        &self,
        hint: Option<IdentityProviderHint>,
        return_to: impl Into<String>,
    ) -> Result<(), AuthError> {
        self.provider.login_with_return(hint, Some(return_to.into())).await
    }

    /// Finish sign-in from the callback URL.
    pub async fn complete_login(&self, callback_url: &str) -> Result<AuthenticatedUser, CallbackError> {
        self.session.complete_login(callback_url).await
    }

    /// Sign out everywhere.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.session.logout().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mealplan_auth::{GuardView, MemoryStore, RecordingNavigator, LOGIN_PATH};
    use mealplan_core::ProviderMetadata;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn auth() -> AuthConfig {
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

    fn app_with(auth: AuthConfig) -> (MealPlanApp, Arc<RecordingNavigator>) {
        let api = ApiConfig::new("http://localhost:8000/api/v1".parse().unwrap());
        let navigator = Arc::new(RecordingNavigator::new());
        let app = MealPlanApp::new(auth, api, Arc::new(MemoryStore::new()), navigator.clone()).unwrap();
        (app, navigator)
    }

    fn app() -> (MealPlanApp, Arc<RecordingNavigator>) {
        app_with(auth())
    }

    #[tokio::test]
    async fn test_auto_renew_follows_config() {
        let (app, _) = app();
        let cancel = CancellationToken::new();
        let handle = app.spawn_auto_renew(cancel.clone()).unwrap();
        cancel.cancel();
        handle.await.unwrap();

        let (app, _) = app_with(auth().with_automatic_silent_renew(false, Duration::from_secs(60)));
        assert!(app.spawn_auto_renew(CancellationToken::new()).is_none());

        let app = app.with_auto_renew(AutoRenew::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        app.spawn_auto_renew(cancel).unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_boot_without_credential_is_anonymous() {
        let (app, _) = app();
        let session = app.boot().await;
        assert!(!session.is_authenticated);
        assert!(!session.loading);
        assert_eq!(app.session().snapshot(), session);
    }

    #[tokio::test]
    async fn test_guard_redirects_anonymous_visitor() {
        let (app, _) = app();
        app.boot().await;
        assert_eq!(
            app.guard().evaluate("/meal-plans").await,
            GuardView::Redirect {
                to: LOGIN_PATH.to_string(),
                from: "/meal-plans".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_login_navigates_to_authority() {
        let (app, navigator) = app();
        app.login(Some(IdentityProviderHint::Google)).await.unwrap();

        let url = navigator.last().unwrap();
        assert_eq!(url.path(), "/authorize");
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "identity_provider" && v == "google"));
    }
}
