//! HTTP transport with bearer authentication and renew-once-on-401.

use crate::error::{GatewayError, GatewayResult};
use crate::request::ApiRequest;
use mealplan_auth::{IdentityProvider, SessionSynchronizer};
use mealplan_core::errors::SilentRenewError;
use mealplan_core::ApiConfig;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// HTTP client that authenticates every request with the current access token.
///
/// A 401 triggers one silent renewal and one re-issue of the same request.
/// If renewal fails, interactive login is started and the request fails with
/// [`GatewayError::Renewal`]. The client holds no credential of its own.
pub struct AuthenticatedClient {
    client: Client,
    config: ApiConfig,
    provider: Arc<dyn IdentityProvider>,
    session: Option<Arc<SessionSynchronizer>>,
    renewal_lock: Option<Mutex<()>>,
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("base_url", &self.config.base_url.as_str())
            .field("coalesced_renewal", &self.renewal_lock.is_some())
            .finish_non_exhaustive()
    }
}

impl AuthenticatedClient {
    /// Create a client for the given API.
    pub fn new(config: ApiConfig, provider: Arc<dyn IdentityProvider>) -> GatewayResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(client, config, provider))
    }

    /// Create with a custom reqwest client.
    pub fn with_client(client: Client, config: ApiConfig, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            client,
            config,
            provider,
            session: None,
            renewal_lock: None,
        }
    }

    /// Reset `session` when silent renewal fails.
    #[must_use]
    pub fn with_session(mut self, session: Arc<SessionSynchronizer>) -> Self {
        self.session = Some(session);
        self
    }

    /// Share one renewal between concurrent 401s.
    ///
    /// Off by default: every rejected request renews on its own. When on,
    /// renewals are serialized and a request whose token was already
    /// replaced retries with the new one instead of renewing again.
    #[must_use]
    pub fn with_coalesced_renewal(mut self, enabled: bool) -> Self {
        self.renewal_lock = enabled.then(|| Mutex::new(()));
        self
    }

    /// API configuration.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Send a request, returning the successful response.
    pub async fn send(&self, request: ApiRequest) -> GatewayResult<Response> {
        let mut request = request;
        loop {
            let token = self.provider.get_user().await.map(|c| c.access_token);
            let response = self.dispatch(&request, token.as_deref()).await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if request.retried() {
                    warn!(method = %request.method(), path = request.path(), "Still unauthorized after renewal");
                    return Err(GatewayError::Unauthorized {
                        method: request.method().to_string(),
                        path: request.path().to_string(),
                    });
                }

                request.mark_retried();
                debug!(method = %request.method(), path = request.path(), "Unauthorized; renewing token");
                if let Err(e) = self.renew(token.as_deref()).await {
                    self.fall_back_to_login().await;
                    return Err(GatewayError::Renewal(e));
                }
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(response);
        }
    }

    /// Send a request and decode the JSON response.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> GatewayResult<T> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send a request and discard the response body.
    pub async fn send_empty(&self, request: ApiRequest) -> GatewayResult<()> {
        self.send(request).await.map(drop)
    }

    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> GatewayResult<Response> {
        let url = request.url(&self.config.base_url)?;
        debug!(
            method = %request.method(),
            url = %url,
            authenticated = token.is_some(),
            retried = request.retried(),
            "Making HTTP request"
        );

        let mut builder = self.client.request(request.method().clone(), url);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    async fn renew(&self, rejected_token: Option<&str>) -> Result<(), SilentRenewError> {
        let Some(lock) = &self.renewal_lock else {
            return self.provider.renew_token().await.map(drop);
        };

        let _guard = lock.lock().await;
        if let Some(current) = self.provider.get_user().await {
            if Some(current.access_token.as_str()) != rejected_token {
                debug!("Token already renewed by a concurrent request");
                return Ok(());
            }
        }
        self.provider.renew_token().await.map(drop)
    }

    async fn fall_back_to_login(&self) {
        if let Some(session) = &self.session {
            session.on_renewal_failed();
        }
        info!("Silent renewal failed; starting interactive login");
        if let Err(e) = self.provider.login(None).await {
            warn!(error = %e, "Failed to start interactive login");
        }
    }
}
