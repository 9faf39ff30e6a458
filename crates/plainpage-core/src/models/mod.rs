//! Wire types exchanged with the PlainPage server.
//!
//! Content payloads (pages, folders, ACLs) are treated as opaque JSON by this
//! crate; only the account and app metadata types are modelled here.

pub mod app;
pub mod user;

pub use app::AppInfo;
pub use user::{
    ChangePasswordRequest, DeleteUserRequest, LoginRequest, PatchOperation, TokenUserResponse,
    User,
};
