//! # mealplan
//!
//! Signed-in access to the mealplan backend.
//!
//! Users sign in through an OpenID Connect authority using the
//! authorization-code flow with PKCE. The resulting session is published to
//! the UI, protected views are gated on it, and every backend call carries
//! the current access token, renewing it once when the backend answers 401.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mealplan::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     mealplan::telemetry::init()?;
//!
//!     let app = MealPlanApp::from_env(".mealplan", Arc::new(LogNavigator))?;
//!     if !app.boot().await.is_authenticated {
//!         app.login(None).await?;
//!         return Ok(());
//!     }
//!
//!     for meal in app.api().list_meals().await? {
//!         println!("{}", meal.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`mealplan_core`] - configuration, session state, errors, backend models
//! - [`mealplan_auth`] - OIDC client, token storage, session synchronizer, route guard
//! - [`mealplan_gateway`] - authenticated HTTP transport and the typed meal API

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod app;
pub mod telemetry;

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Configuration, session state, errors, and backend models.
pub use mealplan_core as core;

/// Sign-in, token storage, session synchronization, and route guarding.
pub use mealplan_auth as auth;

/// Authenticated backend access.
pub use mealplan_gateway as gateway;

// ============================================================================
// Flat Re-exports
// ============================================================================

pub use app::{AppError, MealPlanApp};

// Errors
pub use mealplan_core::{AuthError, CallbackError, ClaimsError, ConfigError, SilentRenewError, StorageError};
pub use mealplan_gateway::{GatewayError, GatewayResult};

// Session
pub use mealplan_core::{Session, SessionAction, UserProfile};

// Configuration
pub use mealplan_core::{ApiConfig, AuthConfig, IdentityProviderHint, ProviderMetadata};

// Auth
pub use mealplan_auth::{
    AuthenticatedUser, AutoRenew, FileStore, GuardView, IdentityProvider, KeyValueStore, LogNavigator,
    MemoryStore, Navigator, OidcClient, RouteGuard, SessionSynchronizer, LOGIN_PATH,
};

// Backend
pub use mealplan_core::meals::{Meal, MealPlanEntry, MealPlanEntryWithMeal, MealRating, MealType};
pub use mealplan_gateway::{ApiRequest, AuthenticatedClient, MealApi};

// ============================================================================
// Prelude Module
// ============================================================================

/// Convenient prelude for common imports.
///
/// ```ignore
/// use mealplan::prelude::*;
/// ```
pub mod prelude {
    pub use crate::app::{AppError, MealPlanApp};
    pub use crate::auth::{GuardView, IdentityProvider, LogNavigator, Navigator, RouteGuard};
    pub use crate::core::meals::{Meal, MealPlanEntryWithMeal, MealPlanQuery, MealType};
    pub use crate::core::{ApiConfig, AuthConfig, AuthError, IdentityProviderHint, Session, UserProfile};
    pub use crate::gateway::{GatewayError, MealApi};
}

/// Returns the current version of mealplan.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
