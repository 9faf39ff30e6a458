use anyhow::{Context, Result};
use keyring::Entry;
use tracing::warn;

const SERVICE_NAME: &str = "plainpage";

/// Passwords remembered in the OS keychain, keyed by server and username so
/// two servers with the same login name do not collide.
pub struct CredentialStore;

impl CredentialStore {
    fn entry(server: &str, username: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &format!("{}@{}", username, server))
            .context("Failed to create keyring entry")
    }

    /// Store a password in the OS keychain
    pub fn store(server: &str, username: &str, password: &str) -> Result<()> {
        Self::entry(server, username)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Retrieve a remembered password, if there is one
    pub fn get_password(server: &str, username: &str) -> Option<String> {
        Self::entry(server, username).ok()?.get_password().ok()
    }

    pub fn delete(server: &str, username: &str) -> Result<()> {
        Self::entry(server, username)?
            .delete_credential()
            .context("Failed to delete credential from keychain")
    }

    /// Delete a remembered password if there is one. Keychain failures are
    /// logged, not returned. Returns whether a password was removed.
    pub fn forget(server: &str, username: &str) -> bool {
        if Self::get_password(server, username).is_none() {
            return false;
        }
        match Self::delete(server, username) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, username, "Failed to delete remembered password");
                false
            }
        }
    }
}
