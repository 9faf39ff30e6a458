//! Single-flight renewal of the access token.
//!
//! The server may rotate or invalidate the refresh cookie when it is used, so
//! two overlapping `/auth/refresh` calls can log the user out. Every caller
//! that asks for a refresh while one is running waits on that same call and
//! sees its outcome.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use tracing::{debug, info, warn};

use super::{CookieJar, SessionStore};
use crate::api::error::{check_response, ApiError};
use crate::models::TokenUserResponse;

type InFlight = Shared<BoxFuture<'static, bool>>;
type InFlightSlot = Arc<Mutex<Option<InFlight>>>;

/// Exchanges the refresh cookie for a new access token, at most once at a time.
///
/// Clone is cheap; clones share the session and the in-flight slot.
#[derive(Clone)]
pub struct RefreshCoordinator {
    client: Client,
    refresh_url: Arc<str>,
    session: Arc<SessionStore>,
    cookies: Option<Arc<CookieJar>>,
    in_flight: InFlightSlot,
}

impl RefreshCoordinator {
    /// `client` must be the same cookie-carrying client that performed login.
    pub fn new(client: Client, refresh_url: impl Into<String>, session: Arc<SessionStore>) -> Self {
        Self {
            client,
            refresh_url: Arc::from(refresh_url.into()),
            session,
            cookies: None,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Save `cookies` to disk after each successful refresh
    pub fn with_cookies(mut self, cookies: Arc<CookieJar>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Refresh the access token, or wait for the refresh already running.
    ///
    /// Returns whether a session is active afterwards. On failure the session
    /// has been cleared. The network call runs on its own task, so dropping
    /// this future does not abort it.
    pub async fn refresh(&self) -> bool {
        let pending = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Refresh already in flight, waiting for it");
                    pending.clone()
                }
                None => {
                    let pending = self.start();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await;
        self.session.is_authenticated()
    }

    /// True while a refresh call is outstanding
    pub fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Builds the shared refresh future. Nothing runs until it is first
    /// polled, which happens after the slot lock is released.
    fn start(&self) -> InFlight {
        let client = self.client.clone();
        let url = Arc::clone(&self.refresh_url);
        let session = Arc::clone(&self.session);
        let cookies = self.cookies.clone();
        let release = ReleaseOnDrop(Arc::clone(&self.in_flight));

        async move {
            let task_session = Arc::clone(&session);
            let task = tokio::spawn(async move {
                let _release = release;
                let refreshed = Self::run(&client, &url, &task_session).await;
                if let (true, Some(cookies)) = (refreshed, cookies) {
                    cookies.save();
                }
                refreshed
            });

            match task.await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    warn!(error = %e, "Refresh task aborted, clearing session");
                    session.clear();
                    false
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn run(client: &Client, url: &str, session: &SessionStore) -> bool {
        match Self::exchange(client, url).await {
            Ok(response) => {
                info!(username = %response.user.username, "Access token refreshed");
                session.set(response.access_token, response.user);
                session.is_authenticated()
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                session.clear();
                false
            }
        }
    }

    async fn exchange(client: &Client, url: &str) -> Result<TokenUserResponse, ApiError> {
        let response = client.post(url).send().await?;
        let response = check_response(response).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Empties the in-flight slot when the refresh task finishes, fails, or is dropped
struct ReleaseOnDrop(InFlightSlot);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        // dropped after the guard is released
        let finished = self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(finished);
    }
}
