//! Gating of protected views.

use crate::client::IdentityProvider;
use mealplan_core::Session;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Where unauthenticated visitors are sent.
pub const LOGIN_PATH: &str = "/login";

/// What a protected view should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    /// Still deciding; show a spinner.
    Waiting,
    /// Show the protected content.
    Render,
    /// Send the visitor to `to`, remembering where they came from.
    Redirect {
        /// Target path.
        to: String,
        /// The location that was denied.
        from: String,
    },
}

impl GuardView {
    fn redirect(from: &str) -> Self {
        Self::Redirect {
            to: LOGIN_PATH.to_string(),
            from: from.to_string(),
        }
    }
}

/// Decides whether a protected location may render.
///
/// Content renders only when the session says the user is signed in *and*
/// the provider confirms a credential is stored. Nothing renders while the
/// session is loading.
pub struct RouteGuard {
    session: watch::Receiver<Session>,
    provider: Arc<dyn IdentityProvider>,
    decision: Mutex<Option<GuardView>>,
}

impl std::fmt::Debug for RouteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGuard")
            .field("decision", &*self.decision.lock())
            .finish_non_exhaustive()
    }
}

impl RouteGuard {
    /// Guard over the given session stream.
    pub fn new(session: watch::Receiver<Session>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            session,
            provider,
            decision: Mutex::new(None),
        }
    }

    /// The view to show right now.
    pub fn view(&self) -> GuardView {
        if self.session.borrow().loading {
            return GuardView::Waiting;
        }
        self.decision.lock().clone().unwrap_or(GuardView::Waiting)
    }

    /// Decide for `location`, waiting for any session load to finish.
    pub async fn evaluate(&self, location: &str) -> GuardView {
        *self.decision.lock() = None;
        let view = self.decide(location).await;
        *self.decision.lock() = Some(view.clone());
        view
    }

    /// As [`evaluate`](Self::evaluate), but gives up without recording a
    /// decision if `cancel` fires first.
    pub async fn evaluate_until(&self, location: &str, cancel: CancellationToken) -> Option<GuardView> {
        *self.decision.lock() = None;
        let view = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(location, "Route guard evaluation cancelled");
                return None;
            }
            view = self.decide(location) => view,
        };
        *self.decision.lock() = Some(view.clone());
        Some(view)
    }

    async fn decide(&self, location: &str) -> GuardView {
        let mut session = self.session.clone();
        loop {
            let closed = session.wait_for(|s| !s.loading).await.is_err();

            let authoritative = match self.provider.is_authenticated().await {
                Ok(authenticated) => authenticated,
                Err(e) => {
                    warn!(error = %e, "Authentication check failed; treating as signed out");
                    false
                }
            };

            let (loading, is_authenticated) = {
                let current = session.borrow_and_update();
                (current.loading, current.is_authenticated)
            };
            if loading && !closed {
                continue;
            }

            let view = if !loading && is_authenticated && authoritative {
                GuardView::Render
            } else {
                GuardView::redirect(location)
            };
            debug!(location, ?view, "Route guard decided");
            return view;
        }
    }
}
