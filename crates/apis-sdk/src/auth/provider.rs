//! Authentication backend trait and runtime dispatch
//!
//! Both backends expose the same operation set. Which one is active is
//! decided by the server at runtime, so [`AuthBackend`] is a tagged variant
//! rather than a generic parameter.

use super::session::SessionAuth;
use super::token::TokenAuth;
use crate::error::ApiError;
use crate::notify::Redirect;
use crate::types::{AuthMode, Identity, WhoAmI};
use async_trait::async_trait;

/// Credentials offered to [`AuthProvider::login`]
#[derive(Clone, PartialEq, Eq)]
pub enum LoginRequest {
    /// Email and password, session backend
    Password {
        email: String,
        password: String,
        remember_me: bool,
    },
    /// Start a redirect to the identity provider, token backend
    Redirect,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginRequest::Password {
                email, remember_me, ..
            } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"[REDACTED]")
                .field("remember_me", remember_me)
                .finish(),
            LoginRequest::Redirect => write!(f, "Redirect"),
        }
    }
}

/// Why a login attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many login attempts. Please wait before trying again.")]
    RateLimited,

    #[error("Network error. Please check your connection.")]
    Network,

    #[error("{0}")]
    Login(String),
}

/// Result of [`AuthProvider::login`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Signed in; the server-reported identity
    Authenticated(WhoAmI),
    /// The user must continue at the identity provider
    Redirected { url: String },
    Failed(LoginError),
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, LoginOutcome::Failed(_))
    }
}

/// Result of [`AuthProvider::check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub authenticated: bool,
    /// Where the caller should send an unauthenticated user
    pub redirect_to: Option<Redirect>,
}

/// What [`AuthProvider::on_error`] did with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Local state was discarded; `redirected` is false when another
    /// failure already performed the redirect
    SessionExpired { redirected: bool },
    /// Forbidden message shown, session kept
    Forbidden,
    /// Shown through the generic notification channel
    Notified,
}

/// Operations every authentication backend provides
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Sign in. Never panics or errors; failures are in the outcome.
    async fn login(&self, request: LoginRequest) -> LoginOutcome;

    /// Sign out. Always succeeds locally, whatever the server says.
    async fn logout(&self);

    async fn check(&self) -> CheckResult;

    /// Identity and permissions from one lookup
    async fn who_am_i(&self) -> Option<WhoAmI>;

    async fn identity(&self) -> Option<Identity> {
        self.who_am_i().await.map(|who| who.identity)
    }

    async fn permissions(&self) -> Vec<String> {
        self.who_am_i()
            .await
            .map(|who| who.permissions)
            .unwrap_or_default()
    }

    /// Classify a failed request and perform the matching side effects
    async fn on_error(&self, error: &ApiError) -> ErrorAction;

    fn mode(&self) -> AuthMode;
}

/// The backend selected for this process
#[derive(Debug, Clone)]
pub enum AuthBackend {
    Session(SessionAuth),
    Token(TokenAuth),
}

impl AuthBackend {
    fn provider(&self) -> &dyn AuthProvider {
        match self {
            AuthBackend::Session(session) => session,
            AuthBackend::Token(token) => token,
        }
    }

    pub async fn login(&self, request: LoginRequest) -> LoginOutcome {
        self.provider().login(request).await
    }

    pub async fn logout(&self) {
        self.provider().logout().await
    }

    pub async fn check(&self) -> CheckResult {
        self.provider().check().await
    }

    pub async fn who_am_i(&self) -> Option<WhoAmI> {
        self.provider().who_am_i().await
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.provider().identity().await
    }

    pub async fn permissions(&self) -> Vec<String> {
        self.provider().permissions().await
    }

    pub async fn on_error(&self, error: &ApiError) -> ErrorAction {
        self.provider().on_error(error).await
    }

    pub fn mode(&self) -> AuthMode {
        self.provider().mode()
    }
}
