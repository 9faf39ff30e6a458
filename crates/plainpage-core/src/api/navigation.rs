use std::sync::{Mutex, PoisonError, RwLock};

/// Path of the login page
pub const LOGIN_PATH: &str = "/_login";

/// Query parameter carrying the location to return to after login
const RETURN_TO_PARAM: &str = "returnTo";

/// Where the user currently is, and how to send them elsewhere.
///
/// The web UI backs this with its router; the CLI and tests use
/// [`MemoryNavigator`].
pub trait Navigator: Send + Sync {
    /// Current location as path plus query, e.g. `/wiki/page?rev=3`
    fn current_location(&self) -> String;

    fn navigate(&self, location: &str);
}

/// Login page URL that returns to `location` afterwards
pub fn login_location(location: &str) -> String {
    format!(
        "{}?{}={}",
        LOGIN_PATH,
        RETURN_TO_PARAM,
        urlencoding::encode(location)
    )
}

/// True if `location` is the login page, with or without a query
pub fn is_login_location(location: &str) -> bool {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    path == LOGIN_PATH
}

/// Navigator that only records where it was sent.
#[derive(Debug, Default)]
pub struct MemoryNavigator {
    location: RwLock<String>,
    history: Mutex<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: RwLock::new(location.into()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Every location navigated to, oldest first
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Move without recording a navigation, e.g. when the user follows a link
    pub fn set_location(&self, location: impl Into<String>) {
        *self.location.write().unwrap_or_else(PoisonError::into_inner) = location.into();
    }
}

impl Navigator for MemoryNavigator {
    fn current_location(&self) -> String {
        self.location
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn navigate(&self, location: &str) {
        self.set_location(location);
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(location.to_string());
    }
}
