//! Authenticated request pipeline
//!
//! Every call to the server goes through [`ApisClient::execute`]:
//!
//! 1. Attach credentials for the active mode. Session mode adds the CSRF
//!    header on state-changing methods only, read from the cookie at send
//!    time. Token mode adds the bearer token when a valid one is held.
//! 2. On 401 in token mode, mark the attempt as retried, join the single
//!    shared refresh and re-issue once with the new token.
//! 3. Hand any other failure to the active backend, which expires the
//!    session or notifies the user with sanitized text.

use crate::auth::csrf::{requires_csrf, CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
use crate::auth::{AuthProvider, ErrorAction, SessionAuth, TokenAuth};
use crate::client::ApisClient;
use crate::error::{ApiError, Result};
use crate::notify::LoginReason;
use crate::types::AuthMode;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use url::Url;

/// The one refresh all concurrently failing requests wait on
pub(crate) type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;

/// One logical request. `retried` is set before the single re-issue.
#[derive(Debug, Clone)]
pub(crate) struct RequestAttempt {
    pub method: Method,
    pub target: Url,
    pub body: Option<serde_json::Value>,
    pub retried: bool,
    /// Failures go back to the caller without a user notification
    pub silent: bool,
}

impl RequestAttempt {
    pub fn new(method: Method, target: Url) -> Self {
        Self {
            method,
            target,
            body: None,
            retried: false,
            silent: false,
        }
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

impl ApisClient {
    fn attach(&self, request: RequestBuilder, mode: Option<AuthMode>, method: &Method, bearer: Option<&str>) -> RequestBuilder {
        match mode {
            Some(AuthMode::Session) if requires_csrf(method) => {
                match self.csrf_token() {
                    Some(csrf) => request.header(CSRF_HEADER_NAME, csrf),
                    None => {
                        debug!("No {} cookie held, sending without CSRF header", CSRF_COOKIE_NAME);
                        request
                    }
                }
            }
            Some(AuthMode::Token) => match bearer {
                Some(token) => request.bearer_auth(token),
                None => request,
            },
            _ => request,
        }
    }

    /// Send with credentials attached; returns the response and the bearer
    /// token that was used
    async fn send(&self, attempt: &RequestAttempt, mode: Option<AuthMode>) -> Result<(Response, Option<String>)> {
        let bearer = match mode {
            Some(AuthMode::Token) => self
                .existing_token_manager()
                .and_then(|manager| manager.access_token()),
            _ => None,
        };

        let mut request = self
            .inner
            .http
            .request(attempt.method.clone(), attempt.target.clone());
        if let Some(body) = &attempt.body {
            request = request.json(body);
        }
        let request = self.attach(request, mode, &attempt.method, bearer.as_deref());

        debug!(
            "{} {}{}",
            attempt.method,
            attempt.target.path(),
            if attempt.retried { " (retry)" } else { "" }
        );
        let response = request.send().await.map_err(ApiError::Network)?;
        Ok((response, bearer))
    }

    /// Send once with credentials attached, without any failure handling.
    /// Used by the auth endpoints themselves.
    pub(crate) async fn dispatch(&self, attempt: RequestAttempt) -> Result<Response> {
        let mode = self.inner.mode.cached_mode();
        self.send(&attempt, mode).await.map(|(response, _)| response)
    }

    /// Join the in-flight refresh, or start one. Resolves to a usable
    /// access token or `None`.
    async fn refresh_credential(&self, rejected: Option<String>) -> Option<String> {
        let refresh = {
            let mut slot = self.inner.refresh.lock();
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("Joining in-flight token refresh");
                    in_flight.clone()
                }
                None => {
                    let manager = self.existing_token_manager();
                    let refresh = async move {
                        let manager = manager?;
                        // another request may already have renewed
                        if let Some(current) = manager.access_token() {
                            if Some(&current) != rejected.as_ref() {
                                return Some(current);
                            }
                        }
                        match manager.renew().await {
                            Ok(token) => Some(token),
                            Err(e) => {
                                warn!("Token refresh failed: {}", crate::sanitize::sanitize(&e.to_string()));
                                None
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        let result = refresh.clone().await;

        let mut slot = self.inner.refresh.lock();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&refresh)) {
            *slot = None;
        }
        result
    }

    /// Hand a failure to the active backend
    async fn report(&self, mode: Option<AuthMode>, error: &ApiError) -> ErrorAction {
        match mode {
            Some(AuthMode::Session) => SessionAuth::new(self.clone()).on_error(error).await,
            Some(AuthMode::Token) => match self.existing_token_manager() {
                Some(manager) => TokenAuth::new(self.clone(), manager).on_error(error).await,
                None => self.report_unknown(error),
            },
            None => self.report_unknown(error),
        }
    }

    fn report_unknown(&self, error: &ApiError) -> ErrorAction {
        if error.is_auth_failure() {
            let redirected = self.expire_session(LoginReason::Unauthenticated);
            return ErrorAction::SessionExpired { redirected };
        }
        self.notify_error("Request failed", error);
        ErrorAction::Notified
    }

    async fn fail(&self, mode: Option<AuthMode>, attempt: &RequestAttempt, error: ApiError) -> ApiError {
        if error.is_auth_failure() || !attempt.silent {
            self.report(mode, &error).await;
        }
        error
    }

    /// Run a request through the pipeline
    pub(crate) async fn run(&self, mut attempt: RequestAttempt) -> Result<Response> {
        let mode = self.auth_mode().await;

        loop {
            let (response, bearer) = match self.send(&attempt, mode).await {
                Ok(sent) => sent,
                Err(e) => return Err(self.fail(mode, &attempt, e).await),
            };

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::UNAUTHORIZED && mode == Some(AuthMode::Token) && !attempt.retried {
                attempt.retried = true;
                if self.refresh_credential(bearer).await.is_some() {
                    continue;
                }
                return Err(self.fail(mode, &attempt, ApiError::SessionExpired).await);
            }

            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status, &body);
            return Err(self.fail(mode, &attempt, error).await);
        }
    }

    /// Send an authenticated request and return the raw response
    pub async fn execute(&self, method: Method, path: &str, body: Option<serde_json::Value>) -> Result<Response> {
        let mut attempt = RequestAttempt::new(method, self.endpoint(path)?);
        attempt.body = body;
        self.run(attempt).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = response.bytes().await.map_err(ApiError::Network)?;
        // empty 2xx bodies decode as JSON null
        let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        serde_json::from_slice(bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn to_value<B: Serialize>(body: &B) -> Result<serde_json::Value> {
        serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }

    /// Generic GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.execute(Method::GET, path, None).await?;
        Self::decode(response).await
    }

    /// Generic POST request
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .execute(Method::POST, path, Some(Self::to_value(body)?))
            .await?;
        Self::decode(response).await
    }

    /// Generic PUT request
    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .execute(Method::PUT, path, Some(Self::to_value(body)?))
            .await?;
        Self::decode(response).await
    }

    /// Generic DELETE request
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// POST whose failures are returned without a user notification
    pub(crate) async fn post_silent<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let attempt = RequestAttempt::new(Method::POST, self.endpoint(path)?)
            .body(Self::to_value(body)?)
            .silent();
        let response = self.run(attempt).await?;
        Self::decode(response).await
    }
}
