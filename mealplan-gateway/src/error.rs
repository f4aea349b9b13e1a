//! Gateway error types.

use mealplan_core::errors::SilentRenewError;
use thiserror::Error;

/// Errors returned by the request gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Still 401 after one renewal and retry.
    #[error("Request unauthorized after token renewal: {method} {path}")]
    Unauthorized {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
    },

    /// Silent renewal failed; interactive login has been started.
    #[error("Token renewal failed: {0}")]
    Renewal(#[from] SilentRenewError),

    /// The backend answered with a non-success status.
    #[error("HTTP error {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The request could not be sent or the response not read.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not the expected JSON.
    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request URL could not be built.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl GatewayError {
    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the caller has to sign in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Renewal(_))
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
