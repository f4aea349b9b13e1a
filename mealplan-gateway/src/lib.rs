//! # mealplan-gateway
//!
//! Authenticated access to the mealplan backend.
//!
//! ## Core Concepts
//!
//! - **[`AuthenticatedClient`]**: attaches the current bearer token, renews
//!   once on 401 and re-issues the request
//! - **[`ApiRequest`]**: a backend request, carrying its one-shot retry flag
//! - **[`MealApi`]**: typed meal, meal plan, and rating endpoints
//! - **[`GatewayError`]**: what went wrong, including when to sign in again
//!
//! ## Example
//!
//! ```ignore
//! use mealplan_gateway::{AuthenticatedClient, MealApi};
//! use mealplan_core::ApiConfig;
//! use std::sync::Arc;
//!
//! let client = AuthenticatedClient::new(ApiConfig::from_env()?, provider)?;
//! let api = MealApi::new(Arc::new(client));
//!
//! for meal in api.list_meals().await? {
//!     println!("{}", meal.name);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod api;
pub mod error;
pub mod request;
pub mod transport;

// Re-exports
pub use api::MealApi;
pub use error::{GatewayError, GatewayResult};
pub use request::ApiRequest;
pub use transport::AuthenticatedClient;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{ApiRequest, AuthenticatedClient, GatewayError, GatewayResult, MealApi};
}
