//! Error types for mealplan.
//!
//! The authentication subsystem distinguishes a small set of failure kinds so
//! callers can decide whether to degrade to an anonymous session, fall back to
//! interactive login, or surface the failure to the user.

use thiserror::Error;

/// The main error type for authentication operations.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Completing the authorization-code redirect failed.
    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// Non-interactive token renewal was rejected.
    #[error(transparent)]
    SilentRenew(#[from] SilentRenewError),

    /// The credential store could not be read or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Provider claims could not be projected into a user profile.
    #[error(transparent)]
    Claims(#[from] ClaimsError),

    /// Provider metadata could not be resolved.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Invalid or missing configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias using [`AuthError`].
pub type Result<T> = std::result::Result<T, AuthError>;

/// Failure while handling the authorization redirect.
///
/// Never retried automatically; the user is asked to sign in again.
#[derive(Error, Debug)]
pub enum CallbackError {
    /// The callback URL could not be parsed.
    #[error("Invalid callback URL: {0}")]
    InvalidUrl(String),

    /// The authority redirected back with an error.
    #[error("Authority returned {error}: {description}")]
    Authority {
        /// OAuth error code.
        error: String,
        /// Human readable description, if any.
        description: String,
    },

    /// The callback carried no authorization code.
    #[error("Authorization code missing from callback")]
    MissingCode,

    /// The callback carried no `state` parameter.
    #[error("State parameter missing from callback")]
    MissingState,

    /// No pending authorization matches the returned state.
    #[error("No pending authorization for state {0}")]
    UnknownState(String),

    /// The pending authorization is older than its allowed lifetime.
    #[error("Pending authorization expired")]
    Expired,

    /// The token endpoint rejected the code exchange.
    #[error("Token exchange rejected (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The code exchange could not reach the authority.
    #[error("Token exchange failed: {0}")]
    Network(String),

    /// The ID token nonce did not match the one sent with the request.
    #[error("ID token nonce mismatch")]
    NonceMismatch,

    /// The token response did not yield a usable identity.
    #[error("Invalid identity in token response: {0}")]
    Claims(#[from] ClaimsError),

    /// The pending authorization could not be read or the credential saved.
    #[error("Callback storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// Silent renewal was rejected; the caller must fall back to interactive login.
#[derive(Error, Debug)]
pub enum SilentRenewError {
    /// There is no stored session to renew.
    #[error("No session to renew")]
    NoSession,

    /// The stored session carries no refresh token.
    #[error("Session has no refresh token")]
    NoRefreshToken,

    /// The authority rejected the renewal (session revoked or expired upstream).
    #[error("Renewal rejected (HTTP {status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The authority could not be reached.
    #[error("Renewal failed: {0}")]
    Network(String),

    /// The renewed credential could not be persisted.
    #[error("Renewal storage failure: {0}")]
    Storage(#[from] StorageError),

    /// The renewed token carried an unusable identity.
    #[error("Renewed identity invalid: {0}")]
    Claims(#[from] ClaimsError),
}

/// Credential storage unavailable or corrupt.
///
/// Readers treat this as "no session".
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O failure on the backing store.
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// A stored blob could not be decoded.
    #[error("Corrupt stored value for {key}: {reason}")]
    Corrupt {
        /// Storage key.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// A value could not be encoded for storage.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Provider claims are missing or malformed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    /// A required claim is absent or empty.
    #[error("Missing required claim: {0}")]
    Missing(&'static str),

    /// The ID token is not a decodable JWT.
    #[error("Malformed ID token: {0}")]
    Malformed(String),

    /// Userinfo returned a different subject than the ID token.
    #[error("Subject mismatch between ID token and userinfo")]
    SubjectMismatch,
}

/// Provider metadata could not be obtained.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The discovery document request failed.
    #[error("Discovery request failed: {0}")]
    Network(String),

    /// The discovery endpoint returned a non-success status.
    #[error("Discovery returned HTTP {0}")]
    Status(u16),

    /// The discovery document is missing an endpoint we need.
    #[error("Provider metadata missing {0}")]
    MissingEndpoint(&'static str),
}

/// Invalid or missing configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("{0} is required")]
    Missing(&'static str),

    /// A value failed to parse.
    #[error("{name}: {reason}")]
    Invalid {
        /// Setting name.
        name: &'static str,
        /// Parser message.
        reason: String,
    },
}

impl ConfigError {
    /// Create an invalid-value error.
    pub fn invalid(name: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            name,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_error_converts() {
        let err: AuthError = CallbackError::MissingCode.into();
        assert!(matches!(err, AuthError::Callback(CallbackError::MissingCode)));
        assert!(err.to_string().contains("Authorization code missing"));
    }

    #[test]
    fn test_storage_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StorageError::from(io);
        assert!(matches!(err, StorageError::Io(ref m) if m.contains("denied")));
    }

    #[test]
    fn test_renew_rejected_display() {
        let err = SilentRenewError::Rejected {
            status: 400,
            body: "invalid_grant".into(),
        };
        assert_eq!(err.to_string(), "Renewal rejected (HTTP 400): invalid_grant");
    }

    #[test]
    fn test_config_invalid() {
        let err = ConfigError::invalid("MEALPLAN_API_URL", "relative URL without a base");
        assert_eq!(
            err.to_string(),
            "MEALPLAN_API_URL: relative URL without a base"
        );
    }
}
