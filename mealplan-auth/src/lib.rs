//! Authentication and session synchronization for mealplan.
//!
//! This crate provides the sign-in side of the application:
//!
//! - **Client** - OIDC authorization-code + PKCE client with silent renewal
//! - **Session** - keeps the application [`Session`] in step with the provider
//! - **Guard** - decides whether a protected view may render
//! - **Renew** - background renewal ahead of token expiry
//! - **Store** - credential persistence on disk or in memory
//!
//! ## Example
//!
//! ```rust,ignore
//! use mealplan_auth::{FileStore, LogNavigator, OidcClient, SessionSynchronizer};
//! use mealplan_core::AuthConfig;
//! use std::sync::Arc;
//!
//! let client = OidcClient::new(
//!     AuthConfig::from_env()?,
//!     Arc::new(FileStore::new("/var/lib/mealplan/tokens")),
//!     Arc::new(LogNavigator),
//! )?;
//! let sync = SessionSynchronizer::new(Arc::new(client));
//!
//! let session = sync.boot().await;
//! if !session.is_authenticated {
//!     sync.provider().login(None).await?;
//! }
//! ```
//!
//! ## Sign-in lifecycle
//!
//! `Anonymous` → `login` → `PendingRedirect` → `handle_login_callback` →
//! `Authenticated`. A successful `renew_token` stays `Authenticated`; a
//! failed one returns to `Anonymous` and interactive login is required.
//!
//! [`Session`]: mealplan_core::Session

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod claims;
pub mod client;
pub mod discovery;
pub mod flow;
pub mod guard;
pub mod navigator;
pub mod pkce;
pub mod renew;
pub mod session;
pub mod store;

// Re-exports
pub use claims::{decode_id_token, map_claims_to_profile, IdTokenClaims};
pub use client::{AuthPhase, AuthenticatedUser, IdentityProvider, OidcClient};
pub use discovery::Endpoints;
pub use guard::{GuardView, RouteGuard, LOGIN_PATH};
pub use navigator::{LogNavigator, Navigator, RecordingNavigator};
pub use renew::AutoRenew;
pub use session::SessionSynchronizer;
pub use store::{FileStore, KeyValueStore, MemoryStore, PendingAuthorization, StoredCredential, TokenStore};

use mealplan_core::{AuthConfig, ConfigError};
use std::sync::Arc;

/// Create a client configured from environment variables.
///
/// See [`AuthConfig::from_env`] for the variables read.
pub fn from_env(
    storage: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
) -> Result<OidcClient, ConfigError> {
    OidcClient::new(AuthConfig::from_env()?, storage, navigator)
}

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        GuardView, IdentityProvider, KeyValueStore, Navigator, OidcClient, RouteGuard,
        SessionSynchronizer, StoredCredential,
    };
}
