//! Credential storage and restore.
//!
//! The supervisor reads the credential through a [`SessionStore`] before
//! connecting, writes it back on every `CredentialsUpdate`, and erases it on
//! logout. When nothing is stored, [`ensure_credentials`] restores it from the
//! configured session id:
//!
//! ```text
//! session_id ──▶ SessionSource::parse
//!                  ├─ Blob(bytes)   long base64 that decodes
//!                  └─ Remote(id)  ──▶ RemoteFetcher::fetch(id)
//!                                        │
//!                  Credentials ◀─────────┘ ──▶ SessionStore::save
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};
use wabot_core::Credentials;

use crate::config::SessionConfig;
use crate::config::validation::ID_PLACEHOLDER;

/// Shortest session id treated as an inline base64 blob.
pub const MIN_BLOB_LEN: usize = 64;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while loading, restoring or persisting the credential.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No credential is stored and no session id is configured.
    #[error("no stored credential and no session id configured")]
    NoRestoreSource,

    /// The session id names a remote credential but nothing can fetch it.
    #[error("session id {id:?} needs a remote fetcher, but no remote URL template is configured")]
    RemoteUnavailable { id: String },

    /// The remote fetch failed.
    #[error("failed to fetch session {id:?}: {reason}")]
    RestoreFetch { id: String, reason: String },

    /// The restore source yielded no data.
    #[error("restored credential is empty")]
    RestoreEmpty,

    /// Reading or writing the credential file failed.
    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// SessionStore
// =============================================================================

/// Persistent credential storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the stored credential, if any.
    async fn load(&self) -> SessionResult<Option<Credentials>>;

    /// Replaces the stored credential.
    async fn save(&self, credentials: &Credentials) -> SessionResult<()>;

    /// Deletes the stored credential. Erasing nothing is not an error.
    async fn erase(&self) -> SessionResult<()>;
}

/// A shared SessionStore trait object.
pub type BoxedSessionStore = Arc<dyn SessionStore>;

/// Stores the credential as a single file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.creds_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> SessionResult<Option<Credentials>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => {
                warn!(path = %self.path.display(), "Credential file is empty, ignoring it");
                Ok(None)
            }
            Ok(bytes) => Ok(Some(Credentials::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, credentials: &Credentials) -> SessionResult<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, credentials.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), len = credentials.as_bytes().len(), "Credential saved");
        Ok(())
    }

    async fn erase(&self) -> SessionResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Credential erased");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps the credential in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    credentials: Mutex<Option<Credentials>>,
    saves: AtomicUsize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `credentials`.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(Some(credentials)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Returns the stored credential.
    pub fn current(&self) -> Option<Credentials> {
        self.credentials.lock().clone()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> SessionResult<Option<Credentials>> {
        Ok(self.current())
    }

    async fn save(&self, credentials: &Credentials) -> SessionResult<()> {
        *self.credentials.lock() = Some(credentials.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn erase(&self) -> SessionResult<()> {
        *self.credentials.lock() = None;
        Ok(())
    }
}

// =============================================================================
// Restore
// =============================================================================

/// What a configured session id refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    /// The credential itself, base64-decoded.
    Blob(Vec<u8>),
    /// An identifier resolved by a [`RemoteFetcher`].
    Remote(String),
}

impl SessionSource {
    /// Sniffs a session id: a long base64 string that decodes is a blob,
    /// anything else is a remote identifier.
    pub fn parse(session_id: &str) -> Self {
        let id = session_id.trim();
        if id.len() >= MIN_BLOB_LEN
            && let Ok(bytes) = STANDARD.decode(id)
        {
            return Self::Blob(bytes);
        }
        Self::Remote(id.to_string())
    }
}

/// Downloads a credential by remote identifier.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, id: &str) -> SessionResult<Vec<u8>>;
}

/// Fetches `GET <template with {id} replaced>`.
#[derive(Debug, Clone)]
pub struct HttpRemoteFetcher {
    client: reqwest::Client,
    template: String,
}

impl HttpRemoteFetcher {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            template: template.into(),
        }
    }

    /// Uses a preconfigured client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Returns the URL for `id`.
    pub fn url_for(&self, id: &str) -> String {
        self.template.replace(ID_PLACEHOLDER, id)
    }
}

#[async_trait]
impl RemoteFetcher for HttpRemoteFetcher {
    async fn fetch(&self, id: &str) -> SessionResult<Vec<u8>> {
        let fetch_error = |e: reqwest::Error| SessionError::RestoreFetch {
            id: id.to_string(),
            reason: e.to_string(),
        };

        let url = self.url_for(id);
        debug!(url = %url, "Fetching remote session");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_error)?;
        let body = response.bytes().await.map_err(fetch_error)?;
        Ok(body.to_vec())
    }
}

/// Turns the configured session id into a credential.
#[derive(Clone, Default)]
pub struct SessionRestorer {
    session_id: Option<String>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
}

impl SessionRestorer {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            fetcher: None,
        }
    }

    /// Builds a restorer with an HTTP fetcher when a URL template is configured.
    pub fn from_config(config: &SessionConfig) -> Self {
        let restorer = Self::new(config.session_id.clone());
        match &config.remote_url_template {
            Some(template) => restorer.with_fetcher(HttpRemoteFetcher::new(template)),
            None => restorer,
        }
    }

    pub fn with_fetcher(mut self, fetcher: impl RemoteFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Produces the credential from the session id.
    pub async fn restore(&self) -> SessionResult<Credentials> {
        let session_id = self.session_id.as_deref().ok_or(SessionError::NoRestoreSource)?;

        let bytes = match SessionSource::parse(session_id) {
            SessionSource::Blob(bytes) => {
                info!(len = bytes.len(), "Restoring session from inline blob");
                bytes
            }
            SessionSource::Remote(id) => {
                let fetcher = self
                    .fetcher
                    .as_ref()
                    .ok_or_else(|| SessionError::RemoteUnavailable { id: id.clone() })?;
                info!(id = %id, "Restoring session from remote source");
                fetcher.fetch(&id).await?
            }
        };

        if bytes.is_empty() {
            return Err(SessionError::RestoreEmpty);
        }
        Ok(Credentials::new(bytes))
    }
}

impl std::fmt::Debug for SessionRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRestorer")
            .field("has_session_id", &self.session_id.is_some())
            .field("has_fetcher", &self.fetcher.is_some())
            .finish()
    }
}

/// Loads the stored credential, restoring and saving it first if absent.
///
/// Returns the credential and whether it was restored.
pub async fn ensure_credentials(
    store: &dyn SessionStore,
    restorer: &SessionRestorer,
) -> SessionResult<(Credentials, bool)> {
    if let Some(credentials) = store.load().await? {
        return Ok((credentials, false));
    }

    info!("No stored credential, restoring session");
    let credentials = restorer.restore().await?;
    store.save(&credentials).await?;
    Ok((credentials, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    struct StaticFetcher(&'static [u8]);

    #[async_trait]
    impl RemoteFetcher for StaticFetcher {
        async fn fetch(&self, id: &str) -> SessionResult<Vec<u8>> {
            if id == "missing" {
                return Err(SessionError::RestoreFetch {
                    id: id.to_string(),
                    reason: "404 Not Found".to_string(),
                });
            }
            Ok(self.0.to_vec())
        }
    }

    fn blob_id(payload: &[u8]) -> String {
        STANDARD.encode(payload)
    }

    const CREDS_JSON: &[u8] = br#"{"noiseKey":{"private":"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="},"registered":true}"#;

    #[test]
    fn test_sniff_session_id() {
        assert_eq!(
            SessionSource::parse(&blob_id(CREDS_JSON)),
            SessionSource::Blob(CREDS_JSON.to_vec())
        );
        // Short ids are remote even when they happen to be valid base64.
        assert_eq!(
            SessionSource::parse("AbCdEfGh"),
            SessionSource::Remote("AbCdEfGh".into())
        );
        let long_remote = format!("{}#key", "x".repeat(80));
        assert_eq!(
            SessionSource::parse(&long_remote),
            SessionSource::Remote(long_remote.clone())
        );
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("auth").join("creds.json"));

        assert!(store.load().await.unwrap().is_none());

        assert_ok!(store.save(&Credentials::new(CREDS_JSON)).await);
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.as_bytes(), CREDS_JSON);
        assert!(!store.temp_path().exists());

        assert_ok!(store.erase().await);
        assert!(store.load().await.unwrap().is_none());
        // Erasing twice is fine.
        assert_ok!(store.erase().await);
    }

    #[tokio::test]
    async fn test_restore_without_source() {
        let err = SessionRestorer::new(None).restore().await.unwrap_err();
        assert!(matches!(err, SessionError::NoRestoreSource));
    }

    #[tokio::test]
    async fn test_restore_remote() {
        let restorer =
            SessionRestorer::new(Some("file-123".into())).with_fetcher(StaticFetcher(CREDS_JSON));
        let credentials = restorer.restore().await.unwrap();
        assert_eq!(credentials.as_bytes(), CREDS_JSON);

        let restorer = SessionRestorer::new(Some("missing".into())).with_fetcher(StaticFetcher(b"x"));
        assert!(matches!(
            restorer.restore().await,
            Err(SessionError::RestoreFetch { .. })
        ));

        let restorer = SessionRestorer::new(Some("file-123".into()));
        assert!(matches!(
            restorer.restore().await,
            Err(SessionError::RemoteUnavailable { .. })
        ));

        let restorer = SessionRestorer::new(Some("file-123".into())).with_fetcher(StaticFetcher(b""));
        assert!(matches!(restorer.restore().await, Err(SessionError::RestoreEmpty)));
    }

    #[tokio::test]
    async fn test_ensure_credentials_prefers_stored() {
        let store = MemorySessionStore::with_credentials(Credentials::new(b"stored".to_vec()));
        let restorer = SessionRestorer::new(Some(blob_id(CREDS_JSON)));

        let (credentials, restored) = ensure_credentials(&store, &restorer).await.unwrap();
        assert_eq!(credentials.as_bytes(), b"stored");
        assert!(!restored);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_credentials_restores_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("creds.json"));
        let restorer = SessionRestorer::new(Some(blob_id(CREDS_JSON)));

        let (credentials, restored) = ensure_credentials(&store, &restorer).await.unwrap();
        assert!(restored);
        assert_eq!(credentials.as_bytes(), CREDS_JSON);
        assert_eq!(std::fs::read(store.path()).unwrap(), CREDS_JSON);
    }

    #[test]
    fn test_http_fetcher_url() {
        let fetcher = HttpRemoteFetcher::new("https://sessions.example.com/{id}/creds.json");
        assert_eq!(
            fetcher.url_for("abc"),
            "https://sessions.example.com/abc/creds.json"
        );
    }
}
