//! Provider metadata resolution.

use mealplan_core::errors::{ConfigError, DiscoveryError};
use mealplan_core::{AuthConfig, ProviderMetadata};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// Endpoints required to run the code flow, plus the optional ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Authorization endpoint.
    pub authorization: Url,
    /// Token endpoint.
    pub token: Url,
    /// Userinfo endpoint.
    pub userinfo: Option<Url>,
    /// End-session endpoint.
    pub end_session: Option<Url>,
}

impl TryFrom<ProviderMetadata> for Endpoints {
    type Error = DiscoveryError;

    fn try_from(metadata: ProviderMetadata) -> Result<Self, Self::Error> {
        Ok(Self {
            authorization: metadata
                .authorization_endpoint
                .ok_or(DiscoveryError::MissingEndpoint("authorization_endpoint"))?,
            token: metadata
                .token_endpoint
                .ok_or(DiscoveryError::MissingEndpoint("token_endpoint"))?,
            userinfo: metadata.userinfo_endpoint,
            end_session: metadata.end_session_endpoint,
        })
    }
}

/// Resolves and caches the provider endpoints.
///
/// When the configured metadata already names the authorization and token
/// endpoints no request is made; otherwise the discovery document is fetched
/// once and configured values win per endpoint.
#[derive(Debug)]
pub struct MetadataResolver {
    configured: ProviderMetadata,
    discovery_url: Url,
    resolved: OnceCell<Endpoints>,
}

impl MetadataResolver {
    /// Create a resolver for the given configuration.
    pub fn new(config: &AuthConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            configured: config.metadata.clone(),
            discovery_url: config.discovery_url()?,
            resolved: OnceCell::new(),
        })
    }

    /// The resolved endpoints. A failed fetch is retried on the next call.
    pub async fn endpoints(&self, http: &reqwest::Client) -> Result<&Endpoints, DiscoveryError> {
        self.resolved.get_or_try_init(|| self.resolve(http)).await
    }

    async fn resolve(&self, http: &reqwest::Client) -> Result<Endpoints, DiscoveryError> {
        if self.configured.is_complete() {
            return Endpoints::try_from(self.configured.clone());
        }

        debug!(url = %self.discovery_url, "Fetching OIDC discovery document");
        let response = http
            .get(self.discovery_url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }

        let discovered: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;

        Endpoints::try_from(self.configured.clone().or(discovered))
    }
}
