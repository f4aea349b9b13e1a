//! Keeps the application [`Session`] in step with the identity provider.

use crate::client::{AuthenticatedUser, IdentityProvider};
use crate::guard::RouteGuard;
use mealplan_core::errors::{AuthError, CallbackError};
use mealplan_core::{Session, SessionAction};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Owns the session state and publishes every change to subscribers.
pub struct SessionSynchronizer {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<Session>,
}

impl std::fmt::Debug for SessionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSynchronizer")
            .field("session", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Dispatches [`SessionAction::Finished`] when dropped, so `loading` is
/// cleared on every exit path including cancellation.
struct FinishOnDrop<'a>(&'a watch::Sender<Session>);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        apply(self.0, SessionAction::Finished);
    }
}

fn apply(state: &watch::Sender<Session>, action: SessionAction) {
    debug!(?action, "Session transition");
    state.send_modify(|session| *session = std::mem::take(session).reduce(action));
}

impl SessionSynchronizer {
    /// Start with an anonymous, idle session.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(Session::new());
        Self { provider, state }
    }

    /// The identity provider this synchronizer reads from.
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Receive every future session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// The current session.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Apply an explicit transition.
    pub fn dispatch(&self, action: SessionAction) {
        apply(&self.state, action);
    }

    /// A route guard over this session.
    pub fn guard(&self) -> RouteGuard {
        RouteGuard::new(self.subscribe(), Arc::clone(&self.provider))
    }

    /// Restore the session from the stored credential.
    ///
    /// Running it again with unchanged provider state yields the same session.
    pub async fn boot(&self) -> Session {
        self.dispatch(SessionAction::Started);
        {
            let _finish = FinishOnDrop(&self.state);
            let action = match self.provider.get_user().await {
                Some(credential) => match self.provider.map_user(&credential) {
                    Ok(profile) => {
                        debug!(subject = %profile.id, "Restored session");
                        SessionAction::Login(profile)
                    }
                    Err(e) => {
                        warn!(error = %e, "Stored identity rejected");
                        SessionAction::Failed(format!("initialization error: {e}"))
                    }
                },
                None => SessionAction::Anonymous,
            };
            self.dispatch(action);
        }
        self.snapshot()
    }

    /// Finish sign-in after the authority redirected back to `callback_url`.
    pub async fn complete_login(&self, callback_url: &str) -> Result<AuthenticatedUser, CallbackError> {
        self.dispatch(SessionAction::Started);
        let _finish = FinishOnDrop(&self.state);
        match self.provider.handle_login_callback(callback_url).await {
            Ok(user) => {
                self.dispatch(SessionAction::Login(user.profile.clone()));
                Ok(user)
            }
            Err(e) => {
                self.dispatch(SessionAction::Failed(format!("authentication failed: {e}")));
                Err(e)
            }
        }
    }

    /// Sign out at the provider and reset the session.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let result = self.provider.logout().await;
        self.dispatch(SessionAction::Reset);
        info!("Session reset after sign-out");
        result
    }

    /// Silent renewal failed for good; drop the session.
    pub fn on_renewal_failed(&self) {
        info!("Session reset after failed renewal");
        self.dispatch(SessionAction::Reset);
    }
}
