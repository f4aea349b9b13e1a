//! # mealplan-core
//!
//! Core types, configuration, and error handling for mealplan.
//!
//! This crate provides the foundational types shared by the other mealplan crates:
//!
//! - **Session**: The application session and its transitions
//! - **Settings**: Identity provider and API configuration
//! - **Errors**: Authentication error taxonomy
//! - **Meals**: Backend models for meals, meal plans, and ratings
//! - **Identifiers**: Type-safe ids and timestamp helpers
//!
//! ## Example
//!
//! ```rust
//! use mealplan_core::{Session, SessionAction, UserProfile};
//!
//! let user = UserProfile {
//!     id: "sub-1".into(),
//!     username: "ada".into(),
//!     email: "ada@example.com".into(),
//!     full_name: None,
//! };
//!
//! let session = Session::new()
//!     .reduce(SessionAction::Started)
//!     .reduce(SessionAction::Login(user))
//!     .reduce(SessionAction::Finished);
//!
//! assert!(session.is_authenticated);
//! assert!(!session.loading);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod errors;
pub mod identifier;
pub mod meals;
pub mod session;
pub mod settings;

// Re-exports for convenience
pub use errors::{
    AuthError, CallbackError, ClaimsError, ConfigError, DiscoveryError, Result,
    SilentRenewError, StorageError,
};
pub use identifier::{now_utc, AccountId, MealId, MealPlanId, MealRatingId};
pub use meals::{
    Meal, MealCategory, MealCreate, MealPlanEntry, MealPlanEntryCreate, MealPlanEntryUpdate,
    MealPlanEntryWithMeal, MealPlanQuery, MealPlanStatus, MealRating, MealRatingCreate, MealType,
    MealUpdate, RatingValue,
};
pub use session::{Session, SessionAction, UserProfile};
pub use settings::{ApiConfig, AuthConfig, IdentityProviderHint, ProviderMetadata};

/// Prelude module for common imports.
///
/// ```rust
/// use mealplan_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::errors::{AuthError, Result};
    pub use crate::meals::{Meal, MealPlanEntry, MealRating, MealType};
    pub use crate::session::{Session, SessionAction, UserProfile};
    pub use crate::settings::{ApiConfig, AuthConfig};
}
