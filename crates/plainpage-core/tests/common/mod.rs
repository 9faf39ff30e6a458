#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use mockito::{Server, ServerGuard};
use serde_json::json;

use plainpage_core::models::User;
use plainpage_core::{ApiClient, Config, MemoryNavigator, SessionStore};

pub struct Harness {
    pub server: ServerGuard,
    pub api: ApiClient,
    pub session: Arc<SessionStore>,
    pub navigator: Arc<MemoryNavigator>,
}

/// Client against a fresh mock server, with the navigator at `location`
pub async fn harness(location: &str) -> Harness {
    let server = Server::new_async().await;
    let config = Config {
        server_url: server.url(),
        ..Config::default()
    };
    let session = Arc::new(SessionStore::in_memory());
    let navigator = Arc::new(MemoryNavigator::new(location));
    let api = ApiClient::new(&config, Arc::clone(&session), navigator.clone())
        .expect("Failed to build client");
    Harness {
        server,
        api,
        session,
        navigator,
    }
}

/// JWT-shaped token whose `exp` is `secs` from now; `tag` keeps tokens distinct
pub fn token_expiring_in(secs: i64, tag: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = json!({
        "sub": tag,
        "exp": Utc::now().timestamp() + secs,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig-{}", header, payload, tag)
}

pub fn alice() -> User {
    User {
        id: "u1".to_string(),
        username: "alice".to_string(),
        display_name: "Alice".to_string(),
    }
}

/// Body of a successful login or refresh response
pub fn token_body(token: &str) -> String {
    json!({
        "accessToken": token,
        "user": {"id": "u1", "username": "alice", "displayName": "Alice"},
    })
    .to_string()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
