//! Authorization-code + PKCE flow requests.
//!
//! These functions do NOT store anything. The caller persists the returned
//! tokens.

use crate::pkce::{PkceSecrets, CHALLENGE_METHOD};
use mealplan_core::errors::{CallbackError, SilentRenewError};
use mealplan_core::{AuthConfig, IdentityProviderHint};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Errors talking to the token or userinfo endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TokenRequestError {
    /// The endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// The endpoint could not be reached or answered garbage.
    #[error("{0}")]
    Network(String),
}

impl From<reqwest::Error> for TokenRequestError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<TokenRequestError> for CallbackError {
    fn from(err: TokenRequestError) -> Self {
        match err {
            TokenRequestError::Rejected { status, body } => Self::Rejected { status, body },
            TokenRequestError::Network(message) => Self::Network(message),
        }
    }
}

impl From<TokenRequestError> for SilentRenewError {
    fn from(err: TokenRequestError) -> Self {
        match err {
            TokenRequestError::Rejected { status, body } => Self::Rejected { status, body },
            TokenRequestError::Network(message) => Self::Network(message),
        }
    }
}

/// Token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// ID token; refresh responses may omit it.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Refresh token; refresh responses may omit it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("has_id_token", &self.id_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Build the authorization URL for a login attempt.
pub fn authorization_url(
    endpoint: &Url,
    config: &AuthConfig,
    secrets: &PkceSecrets,
    hint: Option<&IdentityProviderHint>,
) -> Url {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", config.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scope())
            .append_pair("state", &secrets.state)
            .append_pair("code_challenge", &secrets.code_challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("response_mode", "query")
            .append_pair("nonce", &secrets.nonce);

        for (key, value) in &config.extra_query_params {
            query.append_pair(key, value);
        }
        if let Some(hint) = hint {
            query.append_pair("identity_provider", hint.as_str());
        }
    }
    url
}

/// Build the end-session URL.
pub fn end_session_url(endpoint: &Url, config: &AuthConfig, id_token_hint: Option<&str>) -> Url {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        if let Some(hint) = id_token_hint {
            query.append_pair("id_token_hint", hint);
        }
        query
            .append_pair("client_id", &config.client_id)
            .append_pair(
                "post_logout_redirect_uri",
                config.post_logout_redirect_uri.as_str(),
            );
    }
    url
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_endpoint: &Url,
    config: &AuthConfig,
    code: &str,
    redirect_uri: &Url,
    code_verifier: &str,
) -> Result<TokenResponse, TokenRequestError> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri.as_str()),
        ("client_id", config.client_id.as_str()),
        ("code_verifier", code_verifier),
    ];
    post_token(http, token_endpoint, &params).await
}

/// Renew tokens with the refresh-token grant.
pub async fn refresh(
    http: &reqwest::Client,
    token_endpoint: &Url,
    config: &AuthConfig,
    refresh_token: &str,
) -> Result<TokenResponse, TokenRequestError> {
    let scope = config.scope();
    let params = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", config.client_id.as_str()),
        ("scope", scope.as_str()),
    ];
    post_token(http, token_endpoint, &params).await
}

/// Fetch userinfo claims with the given access token.
pub async fn fetch_userinfo(
    http: &reqwest::Client,
    userinfo_endpoint: &Url,
    access_token: &str,
) -> Result<Value, TokenRequestError> {
    debug!(url = %userinfo_endpoint, "Loading userinfo");
    let response = http
        .get(userinfo_endpoint.clone())
        .bearer_auth(access_token)
        .header("Accept", "application/json")
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(TokenRequestError::Rejected { status, body });
    }

    Ok(response.json().await?)
}

async fn post_token(
    http: &reqwest::Client,
    token_endpoint: &Url,
    params: &[(&str, &str)],
) -> Result<TokenResponse, TokenRequestError> {
    debug!(
        url = %token_endpoint,
        grant_type = params.first().map(|(_, v)| *v).unwrap_or_default(),
        "Calling token endpoint"
    );
    let response = http
        .post(token_endpoint.clone())
        .header("Accept", "application/json")
        .form(params)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(TokenRequestError::Rejected { status, body });
    }

    Ok(response.json().await?)
}
