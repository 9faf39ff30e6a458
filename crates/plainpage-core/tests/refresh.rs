mod common;

use std::sync::Arc;

use futures::future::join_all;
use mockito::Server;

use common::{alice, token_body, token_expiring_in};
use plainpage_core::auth::RefreshCoordinator;
use plainpage_core::SessionStore;

const REFRESH: &str = "/_api/auth/refresh";

fn coordinator(server: &mockito::ServerGuard, session: &Arc<SessionStore>) -> RefreshCoordinator {
    RefreshCoordinator::new(
        reqwest::Client::new(),
        format!("{}{}", server.url(), REFRESH),
        Arc::clone(session),
    )
}

#[tokio::test]
async fn successful_refresh_replaces_session() {
    let mut server = Server::new_async().await;
    let session = Arc::new(SessionStore::in_memory());
    session.set("old".to_string(), alice());
    let new = token_expiring_in(3600, "new");

    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(token_body(&new))
        .expect(1)
        .create_async()
        .await;

    let refresher = coordinator(&server, &session);
    assert!(refresher.refresh().await);
    assert_eq!(session.token(), new);
    assert_eq!(session.user(), Some(alice()));
    assert!(!refresher.is_refreshing());

    refresh.assert_async().await;
}

#[tokio::test]
async fn rejected_refresh_clears_session() {
    let mut server = Server::new_async().await;
    let session = Arc::new(SessionStore::in_memory());
    session.set("old".to_string(), alice());

    let refresh = server
        .mock("POST", REFRESH)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let refresher = coordinator(&server, &session);
    assert!(!refresher.refresh().await);
    assert!(!session.is_authenticated());
    assert!(session.user().is_none());
    assert!(!refresher.is_refreshing());

    refresh.assert_async().await;
}

#[tokio::test]
async fn malformed_refresh_body_clears_session() {
    let mut server = Server::new_async().await;
    let session = Arc::new(SessionStore::in_memory());
    session.set("old".to_string(), alice());

    let _refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(r#"{"unexpected":true}"#)
        .create_async()
        .await;

    assert!(!coordinator(&server, &session).refresh().await);
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn unreachable_server_clears_session() {
    let session = Arc::new(SessionStore::in_memory());
    session.set("old".to_string(), alice());

    let refresher = RefreshCoordinator::new(
        reqwest::Client::new(),
        format!("http://127.0.0.1:9{}", REFRESH),
        Arc::clone(&session),
    );
    assert!(!refresher.refresh().await);
    assert!(!session.is_authenticated());
    assert!(!refresher.is_refreshing());
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh_call() {
    let mut server = Server::new_async().await;
    let session = Arc::new(SessionStore::in_memory());
    session.set("old".to_string(), alice());
    let new = token_expiring_in(3600, "new");

    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(token_body(&new))
        .expect(1)
        .create_async()
        .await;

    let refresher = coordinator(&server, &session);
    let results = join_all((0..10).map(|_| refresher.refresh())).await;
    assert!(results.into_iter().all(|refreshed| refreshed));
    assert_eq!(session.token(), new);

    refresh.assert_async().await;
}

#[tokio::test]
async fn concurrent_callers_share_a_failure() {
    let mut server = Server::new_async().await;
    let session = Arc::new(SessionStore::in_memory());
    session.set("old".to_string(), alice());

    let refresh = server
        .mock("POST", REFRESH)
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let refresher = coordinator(&server, &session);
    let clone = refresher.clone();
    let (a, b, c) = tokio::join!(refresher.refresh(), clone.refresh(), refresher.refresh());
    assert!(!a && !b && !c);
    assert!(!session.is_authenticated());

    refresh.assert_async().await;
}

#[tokio::test]
async fn lock_is_released_after_each_refresh() {
    let mut server = Server::new_async().await;
    let session = Arc::new(SessionStore::in_memory());
    session.set("old".to_string(), alice());

    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(token_body(&token_expiring_in(3600, "new")))
        .expect(2)
        .create_async()
        .await;

    let refresher = coordinator(&server, &session);
    assert!(refresher.refresh().await);
    assert!(!refresher.is_refreshing());
    assert!(refresher.refresh().await);

    refresh.assert_async().await;
}

#[tokio::test]
async fn refresh_completes_when_caller_gives_up() {
    let mut server = Server::new_async().await;
    let session = Arc::new(SessionStore::in_memory());
    session.set("old".to_string(), alice());
    let new = token_expiring_in(3600, "new");

    let refresh = server
        .mock("POST", REFRESH)
        .with_status(200)
        .with_body(token_body(&new))
        .expect(1)
        .create_async()
        .await;

    let refresher = coordinator(&server, &session);
    {
        // poll once so the refresh task is spawned, then drop the caller
        let mut call = Box::pin(refresher.refresh());
        let _ = futures::poll!(call.as_mut());
    }

    for _ in 0..100 {
        if !refresher.is_refreshing() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(!refresher.is_refreshing());
    assert_eq!(session.token(), new);

    refresh.assert_async().await;
}
