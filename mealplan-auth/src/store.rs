//! Credential persistence.
//!
//! [`KeyValueStore`] is the raw string store (a directory of files, or memory);
//! [`TokenStore`] layers the typed credential and pending-authorization
//! records on top of it.

use crate::claims::IdTokenClaims;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mealplan_core::errors::StorageError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const PENDING_PREFIX: &str = "oidc.pending.";

/// Raw string key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// One file per key under a directory.
///
/// Files are written with mode 0600 on Unix.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Store files under `base_path`; the directory is created on first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Directory holding the files.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys must not escape the base directory.
        let safe_key = key.replace(['/', '\\'], "_").replace("..", "_");
        self.base_path.join(safe_key)
    }

    async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&self.base_path, perms).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.ensure_dir().await?;
        let path = self.path_for(key);
        tokio::fs::write(&path, value).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&path, perms).await?;
        }

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    keys.push(name.to_string());
                }
            }
        }
        Ok(keys)
    }
}

/// In-process store. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// The persisted result of a successful sign-in or renewal.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// Raw ID token (sent as `id_token_hint` on logout).
    pub id_token: String,
    /// Refresh token, if the authority issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Access token expiry; `None` if the authority gave no lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Identity claims (ID token merged with userinfo).
    pub profile: IdTokenClaims,
}

impl StoredCredential {
    /// Whether the access token has expired, allowing `grace` past the expiry.
    pub fn is_expired(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let grace = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
        expires_at
            .checked_add_signed(grace)
            .is_some_and(|deadline| now >= deadline)
    }
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("subject", &self.profile.sub)
            .finish_non_exhaustive()
    }
}

/// State kept between `login` and the redirect back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// `state` sent to the authority.
    pub state: String,
    /// `nonce` sent to the authority.
    pub nonce: String,
    /// PKCE verifier for the code exchange.
    pub code_verifier: String,
    /// Redirect URI used for this request.
    pub redirect_uri: Url,
    /// When `login` was called.
    pub created_at: DateTime<Utc>,
    /// Location to return to after sign-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
}

impl PendingAuthorization {
    /// Whether the record is older than `ttl`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.created_at > ttl,
            Err(_) => false,
        }
    }
}

/// Typed access to the credential and pending authorizations.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<dyn KeyValueStore>,
    credential_key: String,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("credential_key", &self.credential_key)
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Wrap a raw store. `credential_key` is normally [`AuthConfig::storage_key`].
    ///
    /// [`AuthConfig::storage_key`]: mealplan_core::AuthConfig::storage_key
    pub fn new(inner: Arc<dyn KeyValueStore>, credential_key: impl Into<String>) -> Self {
        Self {
            inner,
            credential_key: credential_key.into(),
        }
    }

    /// Key the credential blob is stored under.
    pub fn credential_key(&self) -> &str {
        &self.credential_key
    }

    /// Read the stored credential.
    pub async fn load_credential(&self) -> Result<Option<StoredCredential>, StorageError> {
        self.load(&self.credential_key).await
    }

    /// Persist a credential, superseding the previous one.
    pub async fn save_credential(&self, credential: &StoredCredential) -> Result<(), StorageError> {
        let blob = serde_json::to_string(credential)?;
        self.inner.set(&self.credential_key, blob).await
    }

    /// Forget the credential.
    pub async fn clear_credential(&self) -> Result<(), StorageError> {
        self.inner.remove(&self.credential_key).await
    }

    /// Persist a pending authorization under its state.
    pub async fn save_pending(&self, pending: &PendingAuthorization) -> Result<(), StorageError> {
        let blob = serde_json::to_string(pending)?;
        self.inner.set(&pending_key(&pending.state), blob).await
    }

    /// Read and remove the pending authorization for `state`.
    ///
    /// The record is removed even if it fails to decode. A state that maps
    /// onto the credential key is treated as unknown.
    pub async fn take_pending(&self, state: &str) -> Result<Option<PendingAuthorization>, StorageError> {
        let key = pending_key(state);
        if key == self.credential_key {
            return Ok(None);
        }
        let pending = self.load(&key).await;
        self.inner.remove(&key).await?;
        pending
    }

    /// Remove pending authorizations older than `ttl`, and any that are unreadable.
    ///
    /// Returns the number removed.
    pub async fn prune_pending(&self, ttl: Duration) -> Result<usize, StorageError> {
        let now = Utc::now();
        let mut removed = 0;
        for key in self.inner.keys().await? {
            if !key.starts_with(PENDING_PREFIX) || key == self.credential_key {
                continue;
            }
            let stale = match self.load::<PendingAuthorization>(&key).await {
                Ok(Some(pending)) => pending.is_stale(now, ttl),
                Ok(None) => false,
                Err(_) => true,
            };
            if stale {
                self.inner.remove(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn load<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let Some(blob) = self.inner.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&blob)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

fn pending_key(state: &str) -> String {
    format!("{PENDING_PREFIX}{state}")
}
