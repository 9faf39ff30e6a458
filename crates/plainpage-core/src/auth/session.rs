use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::expiry;
use crate::models::User;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Access token plus the user it was issued to.
///
/// An empty `access_token` means "not logged in"; `user` is only present
/// alongside a non-empty token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub user: Option<User>,
}

impl SessionData {
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Expiry decoded from the token, if known
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match expiry::expiry_of(&self.access_token) {
            0 => None,
            exp => DateTime::from_timestamp(exp, 0),
        }
    }

    /// Minutes remaining until the token expires (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expires_at()
            .map(|at| (at - Utc::now()).num_minutes().max(0))
    }

    /// Persisted state is only usable if token and user agree
    fn is_consistent(&self) -> bool {
        self.access_token.is_empty() == self.user.is_none()
    }
}

/// Holder of the current session, shared by every request in flight.
///
/// Writes go to `session.json` in the cache directory when one is configured,
/// so a session survives a restart. The lock is never held across an await.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    data: RwLock<SessionData>,
}

impl SessionStore {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(SessionData::default()),
        }
    }

    /// Store persisted under `cache_dir`, restored from disk immediately.
    /// A missing or unreadable session file yields an empty session.
    pub fn persistent(cache_dir: impl Into<PathBuf>) -> Self {
        let path = cache_dir.into().join(SESSION_FILE);
        let data = Self::restore(&path);
        debug!(path = %path.display(), authenticated = data.is_authenticated(), "Session restored");
        Self {
            path: Some(path),
            data: RwLock::new(data),
        }
    }

    /// Directory the session is persisted in, if any
    pub fn cache_dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }

    fn restore(path: &Path) -> SessionData {
        if !path.exists() {
            return SessionData::default();
        }
        match Self::read_session_file(path) {
            Ok(data) if data.is_consistent() => data,
            Ok(_) => {
                warn!(path = %path.display(), "Ignoring inconsistent session file");
                SessionData::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                SessionData::default()
            }
        }
    }

    fn read_session_file(path: &Path) -> Result<SessionData> {
        let contents = std::fs::read_to_string(path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    /// Snapshot of the current session
    pub fn get(&self) -> SessionData {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current access token; empty when not logged in
    pub fn token(&self) -> String {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    pub fn user(&self) -> Option<User> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_authenticated()
    }

    /// Replace token and user together. An empty token clears the session.
    pub fn set(&self, access_token: String, user: User) {
        if access_token.is_empty() {
            self.clear();
            return;
        }
        let snapshot = {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            *data = SessionData {
                access_token,
                user: Some(user),
            };
            data.clone()
        };
        self.persist(&snapshot);
    }

    pub fn clear(&self) {
        {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            *data = SessionData::default();
        }
        self.remove_file();
    }

    /// Apply a change to the logged-in user. Returns false if there is none.
    pub fn update_user(&self, f: impl FnOnce(&mut User)) -> bool {
        let snapshot = {
            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            match data.user.as_mut() {
                Some(user) => f(user),
                None => return false,
            }
            data.clone()
        };
        self.persist(&snapshot);
        true
    }

    fn persist(&self, data: &SessionData) {
        let Some(ref path) = self.path else {
            return;
        };
        if let Err(e) = Self::write_session_file(path, data) {
            warn!(path = %path.display(), error = %e, "Failed to save session");
        }
    }

    fn write_session_file(path: &Path, data: &SessionData) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn remove_file(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove session file");
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
