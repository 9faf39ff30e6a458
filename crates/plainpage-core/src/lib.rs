//! Core library for the PlainPage client.
//!
//! This crate provides:
//! - `api`: the authenticated request layer (`ApiClient`) and its error taxonomy
//! - `auth`: the session store, token expiry decoding, and refresh coordination
//! - `models`: wire types exchanged with the PlainPage server
//! - `config`: client configuration loaded from the user's config directory

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{AnonymousFallback, ApiClient, ApiError, MemoryNavigator, Navigator};
pub use auth::{LoginOutcome, SessionData, SessionStore};
pub use config::Config;
