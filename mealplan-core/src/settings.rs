//! Startup configuration.
//!
//! Configuration is read once when the application starts and never re-read.
//! Required values are constructor parameters; everything else has a default
//! and can be overridden with `with_*` methods or environment variables.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default OIDC scopes.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email"];

/// Default backend base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Default backend request timeout.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifetime of a pending authorization between `login` and the callback.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(600);

/// How long before expiry the access token is renewed automatically.
pub const DEFAULT_RENEW_LEAD: Duration = Duration::from_secs(60);

/// External identity provider the authority should route to directly.
///
/// Forwarded as the `identity_provider` authorization parameter so the
/// authority can skip its own provider-selection screen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityProviderHint {
    /// Google accounts.
    Google,
    /// Microsoft accounts.
    Microsoft,
    /// Any other provider name the authority understands.
    Other(String),
}

impl IdentityProviderHint {
    /// Parameter value sent to the authority.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for IdentityProviderHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for IdentityProviderHint {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "google" => Self::Google,
            "microsoft" => Self::Microsoft,
            _ => Self::Other(value.to_string()),
        }
    }
}

/// OIDC provider endpoints.
///
/// Doubles as the shape of the discovery document; any endpoint set in the
/// static configuration wins over the discovered one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<Url>,
    /// Token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<Url>,
    /// Userinfo endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<Url>,
    /// End-session (logout) endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<Url>,
    /// JSON Web Key Set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<Url>,
}

impl ProviderMetadata {
    /// Returns true if the endpoints needed for the code flow are present.
    pub fn is_complete(&self) -> bool {
        self.authorization_endpoint.is_some() && self.token_endpoint.is_some()
    }

    /// Fill every unset field from `other`.
    #[must_use]
    pub fn or(self, other: ProviderMetadata) -> Self {
        Self {
            issuer: self.issuer.or(other.issuer),
            authorization_endpoint: self.authorization_endpoint.or(other.authorization_endpoint),
            token_endpoint: self.token_endpoint.or(other.token_endpoint),
            userinfo_endpoint: self.userinfo_endpoint.or(other.userinfo_endpoint),
            end_session_endpoint: self.end_session_endpoint.or(other.end_session_endpoint),
            jwks_uri: self.jwks_uri.or(other.jwks_uri),
        }
    }
}

/// OIDC client configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthConfig {
    /// Authority base URL.
    pub authority: Url,
    /// OAuth client identifier.
    pub client_id: String,
    /// Where the authority redirects after sign-in.
    pub redirect_uri: Url,
    /// Where the authority redirects after sign-out.
    pub post_logout_redirect_uri: Url,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Extra authorization parameters sent with every login.
    pub extra_query_params: Vec<(String, String)>,
    /// Whether to merge claims from the userinfo endpoint.
    pub load_user_info: bool,
    /// Static metadata overriding discovery.
    pub metadata: ProviderMetadata,
    /// Grace period before a credential counts as expired.
    pub clock_skew: Duration,
    /// Lifetime of a pending authorization.
    pub pending_ttl: Duration,
    /// Renew the access token in the background before it expires.
    pub automatic_silent_renew: bool,
    /// How long before expiry automatic renewal fires.
    pub renew_lead: Duration,
}

impl AuthConfig {
    /// Create a configuration with the required fields.
    ///
    /// The post-logout redirect defaults to the origin of `redirect_uri`.
    pub fn new(authority: Url, client_id: impl Into<String>, redirect_uri: Url) -> Self {
        let post_logout_redirect_uri = origin_of(&redirect_uri);
        Self {
            authority,
            client_id: client_id.into(),
            redirect_uri,
            post_logout_redirect_uri,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            extra_query_params: vec![("prompt".into(), "login".into())],
            load_user_info: true,
            metadata: ProviderMetadata::default(),
            clock_skew: Duration::ZERO,
            pending_ttl: DEFAULT_PENDING_TTL,
            automatic_silent_renew: true,
            renew_lead: DEFAULT_RENEW_LEAD,
        }
    }

    /// Read configuration from the process environment.
    ///
    /// Required: `MEALPLAN_AUTH_AUTHORITY`, `MEALPLAN_AUTH_CLIENT_ID`,
    /// `MEALPLAN_AUTH_REDIRECT_URI`.
    ///
    /// Optional: `MEALPLAN_AUTH_POST_LOGOUT_REDIRECT_URI`,
    /// `MEALPLAN_AUTH_SCOPE` (space separated), `MEALPLAN_AUTH_LOAD_USER_INFO`,
    /// `MEALPLAN_AUTH_PROMPT` (empty disables the `prompt` parameter),
    /// `MEALPLAN_AUTH_AUTOMATIC_SILENT_RENEW`, `MEALPLAN_AUTH_RENEW_LEAD_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let authority = required_url(&lookup, "MEALPLAN_AUTH_AUTHORITY")?;
        let client_id = lookup("MEALPLAN_AUTH_CLIENT_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("MEALPLAN_AUTH_CLIENT_ID"))?;
        let redirect_uri = required_url(&lookup, "MEALPLAN_AUTH_REDIRECT_URI")?;

        let mut config = Self::new(authority, client_id, redirect_uri);

        if let Some(url) = optional_url(&lookup, "MEALPLAN_AUTH_POST_LOGOUT_REDIRECT_URI")? {
            config = config.with_post_logout_redirect_uri(url);
        }
        if let Some(scope) = lookup("MEALPLAN_AUTH_SCOPE") {
            config = config.with_scopes(scope.split_whitespace().map(String::from).collect());
        }
        if let Some(flag) = lookup("MEALPLAN_AUTH_LOAD_USER_INFO") {
            config = config.with_load_user_info(parse_bool("MEALPLAN_AUTH_LOAD_USER_INFO", &flag)?);
        }
        if let Some(prompt) = lookup("MEALPLAN_AUTH_PROMPT") {
            config.extra_query_params.retain(|(k, _)| k != "prompt");
            if !prompt.trim().is_empty() {
                config = config.with_extra_query_param("prompt", prompt.trim());
            }
        }
        if let Some(flag) = lookup("MEALPLAN_AUTH_AUTOMATIC_SILENT_RENEW") {
            config.automatic_silent_renew = parse_bool("MEALPLAN_AUTH_AUTOMATIC_SILENT_RENEW", &flag)?;
        }
        if let Some(secs) = lookup("MEALPLAN_AUTH_RENEW_LEAD_SECS") {
            config.renew_lead = parse_secs("MEALPLAN_AUTH_RENEW_LEAD_SECS", &secs)?;
        }

        Ok(config)
    }

    /// Override the post-logout redirect.
    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, url: Url) -> Self {
        self.post_logout_redirect_uri = url;
        self
    }

    /// Override the requested scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Add (or replace) an extra authorization parameter.
    #[must_use]
    pub fn with_extra_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.extra_query_params.retain(|(k, _)| *k != key);
        self.extra_query_params.push((key, value.into()));
        self
    }

    /// Drop all extra authorization parameters.
    #[must_use]
    pub fn without_extra_query_params(mut self) -> Self {
        self.extra_query_params.clear();
        self
    }

    /// Enable or disable the userinfo request.
    #[must_use]
    pub fn with_load_user_info(mut self, enabled: bool) -> Self {
        self.load_user_info = enabled;
        self
    }

    /// Provide static endpoint metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: ProviderMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the expiry grace period.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Set how long a pending authorization stays valid.
    #[must_use]
    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    /// Enable or disable background renewal, renewing `lead` before expiry.
    #[must_use]
    pub fn with_automatic_silent_renew(mut self, enabled: bool, lead: Duration) -> Self {
        self.automatic_silent_renew = enabled;
        self.renew_lead = lead;
        self
    }

    /// Space-separated scope string.
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// Storage key of the credential blob for this authority and client.
    pub fn storage_key(&self) -> String {
        format!(
            "oidc.user:{}:{}",
            self.authority.as_str().trim_end_matches('/'),
            self.client_id
        )
    }

    /// Discovery document URL.
    pub fn discovery_url(&self) -> Result<Url, ConfigError> {
        let base = format!("{}/", self.authority.as_str().trim_end_matches('/'));
        Url::parse(&base)
            .and_then(|u| u.join(".well-known/openid-configuration"))
            .map_err(|e| ConfigError::invalid("authority", e))
    }
}

/// Backend API configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL every API path is resolved against.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ApiConfig {
    /// Create a configuration for the given base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: DEFAULT_API_TIMEOUT,
        }
    }

    /// Read `MEALPLAN_API_URL` and `MEALPLAN_API_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = match optional_url(&lookup, "MEALPLAN_API_URL")? {
            Some(url) => url,
            None => Url::parse(DEFAULT_API_URL).map_err(|e| ConfigError::invalid("MEALPLAN_API_URL", e))?,
        };
        let mut config = Self::new(base_url);
        if let Some(secs) = lookup("MEALPLAN_API_TIMEOUT_SECS") {
            config.timeout = parse_secs("MEALPLAN_API_TIMEOUT_SECS", &secs)?;
        }
        Ok(config)
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn origin_of(url: &Url) -> Url {
    let origin = url.origin().ascii_serialization();
    Url::parse(&origin).unwrap_or_else(|_| url.clone())
}

fn required_url<F>(lookup: &F, name: &'static str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_url(lookup, name)?.ok_or(ConfigError::Missing(name))
}

fn optional_url<F>(lookup: &F, name: &'static str) -> Result<Option<Url>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => Url::parse(raw.trim())
            .map(Some)
            .map_err(|e| ConfigError::invalid(name, e)),
        _ => Ok(None),
    }
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(name, format!("not a boolean: {other}"))),
    }
}

fn parse_secs(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::invalid(name, e))
}
