//! Bearer-token session
//!
//! The token has an explicit lifecycle: set on login, cleared on logout,
//! read by every outgoing request. A `Session` is a cheap clonable handle
//! injected into the transport; clones share the same token. When backed by
//! a file, the token survives process restarts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Shared bearer-token holder.
#[derive(Clone, Default)]
pub struct Session {
    token: Arc<RwLock<Option<String>>>,
    store: Option<PathBuf>,
}

impl Session {
    /// In-memory session with no token.
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory session pre-loaded with a token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
            store: None,
        }
    }

    /// Session persisted to `path`. An existing non-empty file is loaded.
    pub fn file_backed(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let token = match std::fs::read_to_string(&path) {
            Ok(contents) => Some(contents.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), loaded = token.is_some(), "Opened session store");

        Ok(Self {
            token: Arc::new(RwLock::new(token)),
            store: Some(path),
        })
    }

    /// Path of the backing file, if any.
    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    /// Current token.
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Store a token (login).
    pub async fn set_token(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        if let Some(path) = &self.store {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(path, &token)?;
        }
        *self.token.write().await = Some(token);
        Ok(())
    }

    /// Drop the token (logout).
    pub async fn clear(&self) -> Result<()> {
        if let Some(path) = &self.store {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        *self.token.write().await = None;
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("store", &self.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle() {
        let session = Session::new();
        assert!(!session.is_authenticated().await);

        session.set_token("abc").await.unwrap();
        assert_eq!(session.token().await.as_deref(), Some("abc"));

        // Clones share state
        let other = session.clone();
        other.clear().await.unwrap();
        assert_eq!(session.token().await, None);
    }

    #[tokio::test]
    async fn test_file_backed_persists_across_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("token");

        let session = Session::file_backed(&path).unwrap();
        assert_eq!(session.token().await, None);
        session.set_token("persisted-token").await.unwrap();

        let reopened = Session::file_backed(&path).unwrap();
        assert_eq!(reopened.token().await.as_deref(), Some("persisted-token"));

        reopened.clear().await.unwrap();
        assert!(!path.exists());
        // Clearing twice is fine
        reopened.clear().await.unwrap();
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = Session::with_token("secret");
        assert!(!format!("{:?}", session).contains("secret"));
    }
}
