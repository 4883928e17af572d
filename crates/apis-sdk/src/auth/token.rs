//! Identity-provider token backend
//!
//! Sign-in is a redirect to the provider followed by a code exchange.
//! Identity and permissions come from the access token claims, so checking
//! them costs no network call.

use super::manager::TokenManager;
use super::provider::{AuthProvider, CheckResult, ErrorAction, LoginError, LoginOutcome, LoginRequest};
use crate::client::ApisClient;
use crate::error::{ApiError, ErrorKind, Result};
use crate::notify::{LoginReason, Notification, Redirect};
use crate::sanitize::sanitize;
use crate::types::{AuthMode, WhoAmI};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Token backend bound to a client context and its token manager
#[derive(Debug, Clone)]
pub struct TokenAuth {
    client: ApisClient,
    manager: Arc<TokenManager>,
}

impl TokenAuth {
    pub fn new(client: ApisClient, manager: Arc<TokenManager>) -> Self {
        Self { client, manager }
    }

    /// Exchange the authorization code returned to the redirect URI
    pub async fn complete_login(&self, code: &str, state: &str) -> Result<()> {
        self.manager.complete_authorization(code, state).await?;
        self.client.mark_authenticated();
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn login(&self, request: LoginRequest) -> LoginOutcome {
        if let LoginRequest::Password { .. } = request {
            return LoginOutcome::Failed(LoginError::Login(
                "This server signs in through its identity provider".to_string(),
            ));
        }

        match self.manager.begin_authorization() {
            Ok(url) => {
                self.client
                    .navigator()
                    .navigate(Redirect::External(url.clone()));
                LoginOutcome::Redirected { url }
            }
            Err(e) => {
                warn!("Could not start authorization: {}", e);
                LoginOutcome::Failed(LoginError::Login(e.to_string()))
            }
        }
    }

    async fn logout(&self) {
        if let Err(e) = self.manager.revoke().await {
            warn!("Token revocation failed: {}", sanitize(&e.to_string()));
        }

        let end_session = self.manager.end_session_url();
        self.manager.clear();
        self.client.clear_local_state();
        info!("Signed out");

        let redirect = match end_session {
            Ok(url) => Redirect::External(url),
            Err(e) => {
                warn!("No provider sign-out URL, returning to login: {}", e);
                Redirect::Login {
                    reason: LoginReason::SignedOut,
                }
            }
        };
        self.client.navigator().navigate(redirect);
    }

    async fn check(&self) -> CheckResult {
        let authenticated = self.manager.access_token().is_some();
        CheckResult {
            authenticated,
            redirect_to: (!authenticated).then_some(Redirect::Login {
                reason: LoginReason::Unauthenticated,
            }),
        }
    }

    async fn who_am_i(&self) -> Option<WhoAmI> {
        self.manager.claims().map(|claims| claims.who_am_i())
    }

    async fn on_error(&self, error: &ApiError) -> ErrorAction {
        match error.kind() {
            ErrorKind::SessionExpired => {
                self.manager.clear();
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
        AuthMode::Token
    }
}
