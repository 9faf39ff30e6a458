//! API client for communicating with the PlainPage REST API.
//!
//! Every application request goes through [`ApiClient::fetch`], which walks
//! this ladder until one step produces a response that is not a 401:
//!
//! 1. refresh first if the token is about to expire (best effort)
//! 2. send with the current token, if any
//! 3. on 401 with a token: refresh once (unless another request already
//!    replaced that token) and resend
//! 4. still 401, or refresh failed: drop the session and resend anonymously
//! 5. still 401: redirect to the login page
//!
//! A 401 for a request sent without a token skips straight to step 5. Any
//! other failure is returned to the caller untouched.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::error::{check_response, ApiError};
use super::navigation::{self, Navigator};
use crate::auth::{
    self, CookieJar, LoginOutcome, RefreshCoordinator, SessionStore, TOKEN_EXPIRATION_BUFFER_SECS,
};
use crate::config::Config;
use crate::models::{
    AppInfo, ChangePasswordRequest, DeleteUserRequest, LoginRequest, PatchOperation,
    TokenUserResponse, User,
};

// ============================================================================
// Constants
// ============================================================================

const AUTH_LOGIN: &str = "/auth/login";
const AUTH_REFRESH: &str = "/auth/refresh";
const AUTH_LOGOUT: &str = "/auth/logout";
const APP_INFO: &str = "/app";

/// What to do when a request is still unauthorized after refreshing.
///
/// `Enabled` retries once without credentials, which lets public pages load
/// after the session is lost. `Disabled` goes straight to the login page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnonymousFallback {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Credentials {
    /// Bearer token from the session, if there is one
    Session,
    Anonymous,
}

/// API client for PlainPage.
/// Clone is cheap - clones share the connection pool, cookie jar, session
/// and refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    session: Arc<SessionStore>,
    cookies: Arc<CookieJar>,
    refresher: RefreshCoordinator,
    navigator: Arc<dyn Navigator>,
    anonymous_fallback: AnonymousFallback,
}

impl ApiClient {
    /// Create a new API client for the server described by `config`.
    ///
    /// Cookies are persisted next to the session when the session store has
    /// a cache directory.
    pub fn new(
        config: &Config,
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let base_url: Arc<str> = Arc::from(config.api_base_url());
        let refresh_url = format!("{}{}", base_url, AUTH_REFRESH);
        let cookies = Arc::new(CookieJar::new(&refresh_url, session.cache_dir())?);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_provider(cookies.provider())
            .build()?;

        let refresher = RefreshCoordinator::new(client.clone(), refresh_url, Arc::clone(&session))
            .with_cookies(Arc::clone(&cookies));

        Ok(Self {
            client,
            base_url,
            session,
            cookies,
            refresher,
            navigator,
            anonymous_fallback: AnonymousFallback::default(),
        })
    }

    pub fn with_anonymous_fallback(mut self, policy: AnonymousFallback) -> Self {
        self.anonymous_fallback = policy;
        self
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Renew the access token now. Returns whether a session is active afterwards.
    pub async fn refresh_session(&self) -> bool {
        self.refresher.refresh().await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ===== Authentication =====

    /// Log in with username and password.
    ///
    /// Any existing session is dropped first. Wrong credentials and rate
    /// limiting are reported as [`LoginOutcome`] values; everything else that
    /// goes wrong is an error.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, ApiError> {
        self.session.clear();

        let response = self
            .raw_fetch(Method::POST, AUTH_LOGIN, Some(&LoginRequest { username, password }))
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                info!(username, "Login rejected: invalid credentials");
                return Ok(LoginOutcome::InvalidCredentials);
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = auth::login::retry_after(response.headers());
                warn!(username, retry_after_secs = retry_after.as_secs(), "Login rate limited");
                return Ok(LoginOutcome::RateLimited { retry_after });
            }
            _ => {}
        }

        let response = check_response(response).await?;
        let auth: TokenUserResponse = Self::parse_body(AUTH_LOGIN, response).await?;

        info!(username = %auth.user.username, "Login successful");
        let user = auth.user.clone();
        self.session.set(auth.access_token, auth.user);
        self.cookies.save();
        Ok(LoginOutcome::LoggedIn(user))
    }

    /// Revoke the refresh cookie on the server if possible, then drop the
    /// local session regardless.
    pub async fn logout(&self) {
        match self.raw_fetch(Method::POST, AUTH_LOGOUT, None::<&()>).await {
            Ok(response) if response.status().is_success() => debug!("Refresh token revoked"),
            Ok(response) => debug!(status = %response.status(), "Logout rejected by server, ignoring"),
            Err(e) => debug!(error = %e, "Logout request failed, ignoring"),
        }
        self.session.clear();
        self.cookies.remove_saved();
        info!("Logged out");
    }

    /// Send a request with cookies but without session handling: no bearer
    /// header, no refresh, no redirect. The response is returned whatever its
    /// status.
    pub async fn raw_fetch<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Response, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    // ===== Authenticated requests =====

    /// Perform an application request with session handling.
    ///
    /// Returns `ApiError::Redirected` when the request needs a login the user
    /// does not have; the navigator has then been sent to the login page.
    pub async fn fetch<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = body.map(serde_json::to_vec).transpose()?;
        let response = self.execute(&method, path, body.as_deref()).await?;
        let response = check_response(response).await?;
        Self::parse_body(path, response).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch(Method::GET, path, None::<&()>).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.fetch(Method::POST, path, Some(body)).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.fetch(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch(Method::DELETE, path, None::<&()>).await
    }

    /// Run the refresh/retry ladder and return the first response that is
    /// not a 401.
    async fn execute(
        &self,
        method: &Method,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<Response, ApiError> {
        if self.session.is_authenticated()
            && auth::is_expiring_soon(&self.session.token(), TOKEN_EXPIRATION_BUFFER_SECS)
        {
            debug!(path, "Access token expiring soon, refreshing before request");
            if !self.refresher.refresh().await {
                warn!(path, "Proactive refresh failed, continuing without session");
            }
        }

        let (response, sent_token) = self.send(method, path, body, Credentials::Session).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(sent_token) = sent_token else {
            debug!(path, "Unauthorized without a session");
            return self.redirect_to_login();
        };

        let renewed = if self.session.is_authenticated() && self.session.token() != sent_token {
            debug!(path, "Unauthorized, token already renewed by another request");
            true
        } else {
            debug!(path, "Unauthorized, refreshing access token");
            self.refresher.refresh().await
        };

        if renewed {
            let (retry, _) = self.send(method, path, body, Credentials::Session).await?;
            if retry.status() != StatusCode::UNAUTHORIZED {
                return Ok(retry);
            }
            debug!(path, "Still unauthorized after refresh");
        }

        self.session.clear();
        if self.anonymous_fallback == AnonymousFallback::Disabled {
            return self.redirect_to_login();
        }

        debug!(path, "Retrying without credentials");
        let (anonymous, _) = self.send(method, path, body, Credentials::Anonymous).await?;
        if anonymous.status() != StatusCode::UNAUTHORIZED {
            return Ok(anonymous);
        }

        self.redirect_to_login()
    }

    /// Send one attempt. Headers are built now, so a retry picks up a token
    /// refreshed in the meantime. Also returns the token that was attached.
    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: Option<&[u8]>,
        credentials: Credentials,
    ) -> Result<(Response, Option<String>), ApiError> {
        let (headers, token) = self.request_headers(credentials)?;
        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .headers(headers);
        if let Some(body) = body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }

        let response = request.send().await?;
        debug!(%method, path, status = %response.status(), with_token = token.is_some(), "Request completed");
        Ok((response, token))
    }

    fn request_headers(
        &self,
        credentials: Credentials,
    ) -> Result<(HeaderMap, Option<String>), ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        if credentials == Credentials::Session {
            let token = self.session.token();
            if !token.is_empty() {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
                return Ok((headers, Some(token)));
            }
        }
        Ok((headers, None))
    }

    /// Send the navigator to the login page, unless it is already there
    fn redirect_to_login<T>(&self) -> Result<T, ApiError> {
        let current = self.navigator.current_location();
        if navigation::is_login_location(&current) {
            debug!("Already on login page, not redirecting");
            return Err(ApiError::Unauthorized);
        }

        let location = navigation::login_location(&current);
        info!(%location, "Login required, redirecting");
        self.navigator.navigate(&location);
        Err(ApiError::Redirected { location })
    }

    /// Parse a JSON body; an empty body parses as `null` so `()` works
    async fn parse_body<T: DeserializeOwned>(path: &str, response: Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        let json = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(json).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }

    // ===== Account =====

    fn require_user(&self) -> Result<User, ApiError> {
        self.session.user().ok_or(ApiError::NotLoggedIn)
    }

    fn user_path(username: &str) -> String {
        format!("/auth/users/{}", urlencoding::encode(username))
    }

    /// Change the logged-in user's display name
    pub async fn update_display_name(&self, display_name: &str) -> Result<(), ApiError> {
        let user = self.require_user()?;
        let ops = [PatchOperation::replace("/displayName", display_name)];
        let _: serde_json::Value = self.patch(&Self::user_path(&user.username), &ops).await?;

        self.session
            .update_user(|u| u.display_name = display_name.to_string());
        Ok(())
    }

    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), ApiError> {
        let user = self.require_user()?;
        let path = format!("{}/password", Self::user_path(&user.username));
        let body = ChangePasswordRequest {
            current_password,
            new_password,
        };
        let _: serde_json::Value = self.post(&path, &body).await?;
        info!(username = %user.username, "Password changed");
        Ok(())
    }

    /// Delete the logged-in user's account, then log out
    pub async fn delete_account(&self, password: &str) -> Result<(), ApiError> {
        let user = self.require_user()?;
        let path = format!("{}/delete", Self::user_path(&user.username));
        let _: serde_json::Value = self.post(&path, &DeleteUserRequest { password }).await?;
        info!(username = %user.username, "Account deleted");
        self.logout().await;
        Ok(())
    }

    // ===== App =====

    /// Fetch server metadata; version details are only sent to logged-in users
    pub async fn app_info(&self) -> Result<AppInfo, ApiError> {
        self.get(APP_INFO).await
    }
}
