//! Cookie session backend
//!
//! The server keeps the session in an HttpOnly cookie the client never sees.
//! State-changing calls echo the readable CSRF cookie in a header. There is
//! no client-side renewal: a 401 ends the session.

use super::provider::{AuthProvider, CheckResult, ErrorAction, LoginError, LoginOutcome, LoginRequest};
use crate::client::ApisClient;
use crate::error::{ApiError, ErrorKind, Result};
use crate::notify::{LoginReason, Notification, Redirect};
use crate::pipeline::RequestAttempt;
use crate::sanitize::sanitize;
use crate::types::{AuthMode, ChangePasswordBody, LoginBody, SessionUserEnvelope, WhoAmI};
use async_trait::async_trait;
use futures::FutureExt;
use reqwest::{Method, StatusCode};
use tracing::{debug, info, warn};

/// Session backend bound to a client context
#[derive(Debug, Clone)]
pub struct SessionAuth {
    client: ApisClient,
}

impl SessionAuth {
    pub fn new(client: ApisClient) -> Self {
        Self { client }
    }

    async fn fetch_who_am_i(client: ApisClient) -> Option<WhoAmI> {
        let url = client.endpoint("/api/auth/me").ok()?;
        let response = match client.dispatch(RequestAttempt::new(Method::GET, url)).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Who-am-i request failed: {}", sanitize(&e.to_string()));
                return None;
            }
        };

        if !response.status().is_success() {
            debug!("Who-am-i returned {}", response.status());
            return None;
        }

        match response.json::<SessionUserEnvelope>().await {
            Ok(envelope) => Some(envelope.user.into()),
            Err(e) => {
                warn!("Who-am-i response unreadable: {}", e);
                None
            }
        }
    }

    async fn password_login(&self, email: &str, password: &str, remember_me: bool) -> LoginOutcome {
        let url = match self.client.endpoint("/api/auth/login") {
            Ok(url) => url,
            Err(e) => return LoginOutcome::Failed(LoginError::Login(e.to_string())),
        };
        let body = LoginBody {
            email,
            password,
            remember_me,
        };
        let body = match serde_json::to_value(&body) {
            Ok(body) => body,
            Err(e) => return LoginOutcome::Failed(LoginError::Login(e.to_string())),
        };

        let response = match self
            .client
            .dispatch(RequestAttempt::new(Method::POST, url).body(body))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Login request failed: {}", sanitize(&e.to_string()));
                return LoginOutcome::Failed(LoginError::Network);
            }
        };

        let status = response.status();
        match status {
            s if s.is_success() => match response.json::<SessionUserEnvelope>().await {
                Ok(envelope) => {
                    self.client.mark_authenticated();
                    info!("Signed in as {}", envelope.user.email);
                    LoginOutcome::Authenticated(envelope.user.into())
                }
                Err(e) => LoginOutcome::Failed(LoginError::Login(format!(
                    "unreadable login response: {}",
                    e
                ))),
            },
            StatusCode::UNAUTHORIZED => LoginOutcome::Failed(LoginError::InvalidCredentials),
            StatusCode::TOO_MANY_REQUESTS => LoginOutcome::Failed(LoginError::RateLimited),
            _ => {
                let body = response.text().await.unwrap_or_default();
                let message = match ApiError::from_status(status, &body) {
                    ApiError::Server { message, .. }
                    | ApiError::Forbidden { message }
                    | ApiError::Conflict { message } => message,
                    other => other.to_string(),
                };
                LoginOutcome::Failed(LoginError::Login(sanitize(&message)))
            }
        }
    }

    /// Change the signed-in user's password. CSRF-protected. A wrong current
    /// password comes back as 401 and is returned to the caller rather than
    /// ending the session.
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        let body = serde_json::to_value(ChangePasswordBody {
            current_password,
            new_password,
        })
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let url = self.client.endpoint("/api/auth/change-password")?;

        let response = self
            .client
            .dispatch(RequestAttempt::new(Method::POST, url).body(body))
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Password changed");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => Err(ApiError::InvalidCredentials),
            _ => Err(ApiError::from_status(status, &body)),
        }
    }
}

#[async_trait]
impl AuthProvider for SessionAuth {
    async fn login(&self, request: LoginRequest) -> LoginOutcome {
        match request {
            LoginRequest::Password {
                email,
                password,
                remember_me,
            } => self.password_login(&email, &password, remember_me).await,
            LoginRequest::Redirect => LoginOutcome::Failed(LoginError::Login(
                "This server signs in with email and password".to_string(),
            )),
        }
    }

    async fn logout(&self) {
        let result = match self.client.endpoint("/api/auth/logout") {
            Ok(url) => self
                .client
                .dispatch(RequestAttempt::new(Method::POST, url))
                .await
                .map(|response| response.status()),
            Err(e) => Err(e),
        };

        match result {
            Ok(status) if status.is_success() => debug!("Server session ended"),
            Ok(status) => warn!("Logout returned {}, clearing local state anyway", status),
            Err(e) => warn!(
                "Logout request failed, clearing local state anyway: {}",
                sanitize(&e.to_string())
            ),
        }

        self.client.clear_local_state();
        info!("Signed out");
        self.client.navigator().navigate(Redirect::Login {
            reason: LoginReason::SignedOut,
        });
    }

    async fn check(&self) -> CheckResult {
        let authenticated = self.who_am_i().await.is_some();
        CheckResult {
            authenticated,
            redirect_to: (!authenticated).then_some(Redirect::Login {
                reason: LoginReason::Unauthenticated,
            }),
        }
    }

    async fn who_am_i(&self) -> Option<WhoAmI> {
        let client = self.client.clone();
        self.client
            .identity_cache()
            .get_or_fetch(move || Self::fetch_who_am_i(client).boxed())
            .await
    }

    async fn on_error(&self, error: &ApiError) -> ErrorAction {
        match error.kind() {
            ErrorKind::SessionExpired => {
                let redirected = self.client.expire_session(LoginReason::SessionExpired);
                ErrorAction::SessionExpired { redirected }
            }
            ErrorKind::Forbidden => {
                self.client.notifier().notify(Notification::warning(
                    "Access denied",
                    sanitize(&error.to_string()),
                ));
                ErrorAction::Forbidden
            }
            ErrorKind::RateLimited => {
                self.client.notify_error("Too many requests", error);
                ErrorAction::Notified
            }
            _ => {
                self.client.notify_error("Request failed", error);
                ErrorAction::Notified
            }
        }
    }

    fn mode(&self) -> AuthMode {
        AuthMode::Session
    }
}
