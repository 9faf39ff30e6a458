//! REST API client module for PlainPage servers.
//!
//! This module provides the `ApiClient` through which every request to the
//! server goes. It attaches the bearer token, renews it before or after it
//! expires, retries once, and hands terminal authorization failures to a
//! `Navigator` as a redirect to the login page.

pub mod client;
pub mod error;
pub mod navigation;

pub use client::{AnonymousFallback, ApiClient};
pub use error::ApiError;
pub use navigation::{MemoryNavigator, Navigator, LOGIN_PATH};
