//! Application session state.
//!
//! [`Session`] is the application's view of who is signed in. It is changed
//! only by applying a [`SessionAction`], which keeps every transition in one
//! place and makes the state trivially comparable in tests.

use serde::{Deserialize, Serialize};

/// The signed-in user, projected from identity provider claims.
///
/// Replaced wholesale on re-login; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable subject identifier.
    pub id: String,
    /// Login name (`preferred_username`, falling back to email).
    pub username: String,
    /// Email address.
    pub email: String,
    /// Display name, if the provider sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl UserProfile {
    /// Name to show in the UI.
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }

    /// Single upper-case initial for an avatar.
    pub fn initials(&self) -> String {
        self.display_name()
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_default()
    }
}

/// Application-level session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Whether a user is signed in.
    pub is_authenticated: bool,
    /// The signed-in user.
    pub user: Option<UserProfile>,
    /// A synchronization is in progress.
    pub loading: bool,
    /// Last recoverable error, for display.
    pub last_error: Option<String>,
}

/// A transition of the [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Synchronization started.
    Started,
    /// Synchronization finished (always dispatched, whatever the outcome).
    Finished,
    /// A user signed in or was restored.
    Login(UserProfile),
    /// No user is signed in.
    Anonymous,
    /// A recoverable failure; leaves the user signed out.
    Failed(String),
    /// Sign out, or unrecoverable renewal failure.
    Reset,
}

impl Session {
    /// Initial state at application start.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a transition.
    #[must_use]
    pub fn reduce(self, action: SessionAction) -> Self {
        match action {
            SessionAction::Started => Self {
                loading: true,
                last_error: None,
                ..self
            },
            SessionAction::Finished => Self {
                loading: false,
                ..self
            },
            SessionAction::Login(user) => Self {
                is_authenticated: true,
                user: Some(user),
                last_error: None,
                ..self
            },
            SessionAction::Anonymous => Self {
                is_authenticated: false,
                user: None,
                ..self
            },
            SessionAction::Failed(message) => Self {
                is_authenticated: false,
                user: None,
                last_error: Some(message),
                ..self
            },
            SessionAction::Reset => Self::new(),
        }
    }
}
