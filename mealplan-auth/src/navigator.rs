//! Full-page navigation.

use parking_lot::Mutex;
use url::Url;

/// Hands a URL to whatever displays the application.
///
/// Navigating away supersedes in-page state, so there is nothing to return.
pub trait Navigator: Send + Sync {
    /// Leave the application for `url`.
    fn navigate(&self, url: Url);
}

/// Logs the URL for the user to open manually.
///
/// `id_token_hint` is dropped from the logged URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, url: Url) {
        tracing::info!(url = %without_token_hint(url), "Open this URL to continue");
    }
}

fn without_token_hint(mut url: Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "id_token_hint")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url
}

/// Records every navigation. Useful in tests and headless runs.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<Url>>,
}

impl RecordingNavigator {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every URL navigated to, oldest first.
    pub fn visited(&self) -> Vec<Url> {
        self.visited.lock().clone()
    }

    /// The most recent navigation.
    pub fn last(&self) -> Option<Url> {
        self.visited.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: Url) {
        self.visited.lock().push(url);
    }
}
