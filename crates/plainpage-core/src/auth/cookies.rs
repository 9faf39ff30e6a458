//! Persistence for the refresh cookie.
//!
//! The server sets the refresh token as an HTTP-only cookie scoped to the auth
//! routes. The cookies that would be sent to those routes are written to
//! `cookies.json` beside the session file, so a restored session can still be
//! renewed after a restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::ApiError;

/// Cookie file name in cache directory
const COOKIE_FILE: &str = "cookies.json";

#[derive(Debug, Serialize, Deserialize)]
struct SavedCookies {
    /// URL the cookies were read for; cookies from another server are ignored
    url: String,
    cookies: Vec<String>,
}

/// Cookie jar for the HTTP client, saved to disk when a cache directory is set.
pub struct CookieJar {
    jar: Arc<Jar>,
    /// Auth route whose cookies are persisted
    url: Url,
    path: Option<PathBuf>,
}

impl CookieJar {
    /// `auth_url` is any URL below the auth routes, e.g. the refresh endpoint.
    /// With a `cache_dir`, cookies saved by an earlier run are loaded now.
    pub fn new(auth_url: &str, cache_dir: Option<&Path>) -> Result<Self, ApiError> {
        let url = Url::parse(auth_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", auth_url, e)))?;
        let jar = Self {
            jar: Arc::new(Jar::default()),
            url,
            path: cache_dir.map(|dir| dir.join(COOKIE_FILE)),
        };
        jar.restore();
        Ok(jar)
    }

    /// Handle to pass to `ClientBuilder::cookie_provider`
    pub fn provider(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// `name=value` pairs the jar would send to the auth routes
    pub fn current(&self) -> Vec<String> {
        self.jar
            .cookies(&self.url)
            .and_then(|header| header.to_str().ok().map(str::to_string))
            .map(|header| {
                header
                    .split(';')
                    .map(str::trim)
                    .filter(|pair| !pair.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn restore(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        if !path.exists() {
            return;
        }
        let saved = match Self::read_cookie_file(path) {
            Ok(saved) => saved,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cookie file");
                return;
            }
        };
        if saved.url != self.url.as_str() {
            debug!(saved = %saved.url, "Cookie file belongs to another server, ignoring");
            return;
        }
        for cookie in &saved.cookies {
            // no Path attribute: defaults to the auth routes' directory
            self.jar.add_cookie_str(cookie, &self.url);
        }
        debug!(count = saved.cookies.len(), "Cookies restored");
    }

    fn read_cookie_file(path: &Path) -> Result<SavedCookies> {
        let contents = std::fs::read_to_string(path).context("Failed to read cookie file")?;
        serde_json::from_str(&contents).context("Failed to parse cookie file")
    }

    /// Write the current auth cookies to disk. Failures are logged only.
    pub fn save(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let saved = SavedCookies {
            url: self.url.to_string(),
            cookies: self.current(),
        };
        if let Err(e) = Self::write_cookie_file(path, &saved) {
            warn!(path = %path.display(), error = %e, "Failed to save cookies");
        }
    }

    fn write_cookie_file(path: &Path, saved: &SavedCookies) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(saved)?)?;
        Ok(())
    }

    /// Forget the saved cookies. The in-memory jar is left to the server's
    /// own expiry headers.
    pub fn remove_saved(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove cookie file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFRESH_URL: &str = "http://127.0.0.1:8080/_api/auth/refresh";

    fn set_refresh_cookie(jar: &CookieJar, value: &str) {
        let url = Url::parse(REFRESH_URL).expect("url");
        jar.provider().add_cookie_str(
            &format!("refresh_token={}; Path=/_api/auth; HttpOnly; Max-Age=7776000", value),
            &url,
        );
    }

    #[test]
    fn test_cookies_survive_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jar = CookieJar::new(REFRESH_URL, Some(dir.path())).expect("jar");
        set_refresh_cookie(&jar, "R1");
        jar.save();
        assert!(dir.path().join(COOKIE_FILE).exists());

        let restored = CookieJar::new(REFRESH_URL, Some(dir.path())).expect("jar");
        assert_eq!(restored.current(), vec!["refresh_token=R1".to_string()]);

        // also sent to the other auth routes
        let logout = Url::parse("http://127.0.0.1:8080/_api/auth/logout").expect("url");
        assert!(restored.provider().cookies(&logout).is_some());
    }

    #[test]
    fn test_cookies_of_another_server_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jar = CookieJar::new(REFRESH_URL, Some(dir.path())).expect("jar");
        set_refresh_cookie(&jar, "R1");
        jar.save();

        let other = CookieJar::new("http://wiki.example.org/_api/auth/refresh", Some(dir.path()))
            .expect("jar");
        assert!(other.current().is_empty());
    }

    #[test]
    fn test_corrupt_cookie_file_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(COOKIE_FILE), "{not json").expect("write fixture");

        let jar = CookieJar::new(REFRESH_URL, Some(dir.path())).expect("jar");
        assert!(jar.current().is_empty());
    }

    #[test]
    fn test_remove_saved_forgets_cookies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jar = CookieJar::new(REFRESH_URL, Some(dir.path())).expect("jar");
        set_refresh_cookie(&jar, "R1");
        jar.save();
        jar.remove_saved();

        assert!(!dir.path().join(COOKIE_FILE).exists());
        let restored = CookieJar::new(REFRESH_URL, Some(dir.path())).expect("jar");
        assert!(restored.current().is_empty());
    }

    #[test]
    fn test_in_memory_jar_writes_nothing() {
        let jar = CookieJar::new(REFRESH_URL, None).expect("jar");
        set_refresh_cookie(&jar, "R1");
        jar.save();
        assert_eq!(jar.current(), vec!["refresh_token=R1".to_string()]);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(matches!(
            CookieJar::new("not a url", None),
            Err(ApiError::InvalidUrl(_))
        ));
    }
}
