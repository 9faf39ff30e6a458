//! Authentication module for managing the client session.
//!
//! This module provides:
//! - `SessionStore`: the current access token and user, persisted across restarts
//! - `expiry`: decoding of the `exp` claim embedded in access tokens
//! - `RefreshCoordinator`: single-flight renewal of the access token
//! - `LoginOutcome`: typed result of a login attempt
//! - `CookieJar`: the HTTP client's cookie store, saved beside the session
//!
//! The refresh token itself is never read here; the server sets it as an
//! HTTP-only cookie which the cookie jar carries and persists.

pub mod cookies;
pub mod expiry;
pub mod login;
pub mod refresh;
pub mod session;

pub use cookies::CookieJar;
pub use expiry::{expiry_of, is_expiring_soon, TOKEN_EXPIRATION_BUFFER_SECS};
pub use login::LoginOutcome;
pub use refresh::RefreshCoordinator;
pub use session::{SessionData, SessionStore};
