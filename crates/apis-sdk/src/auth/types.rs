//! Authentication-related types and data structures
//!
//! Identity-provider configuration, the in-memory token set and the error
//! type of the token flow.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zeroize::Zeroize;

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Identity-provider endpoints and client registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// Issuer / realm URL the endpoints were derived from
    pub authority: String,
    /// OAuth authorization endpoint URL
    pub auth_endpoint: String,
    /// OAuth token endpoint URL
    pub token_endpoint: String,
    /// OAuth token revocation endpoint URL
    pub revoke_endpoint: String,
    /// RP-initiated sign-out endpoint URL
    pub end_session_endpoint: String,
    /// Redirect URI for the authorization callback
    pub redirect_uri: String,
    /// Where the provider returns after sign-out
    pub post_logout_redirect_uri: String,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
}

impl AuthConfig {
    /// Derive the Keycloak endpoint layout from an issuer URL
    pub fn from_authority(
        authority: &str,
        client_id: &str,
        redirect_uri: &str,
        post_logout_redirect_uri: &str,
        scopes: Vec<String>,
    ) -> AuthResult<Self> {
        let authority = authority.trim_end_matches('/');
        if authority.is_empty() {
            return Err(AuthError::ConfigError(
                "Identity provider authority is missing".to_string(),
            ));
        }
        if client_id.is_empty() {
            return Err(AuthError::ConfigError(
                "Identity provider client ID is missing".to_string(),
            ));
        }

        let base = format!("{}/protocol/openid-connect", authority);
        Ok(Self {
            client_id: client_id.to_string(),
            authority: authority.to_string(),
            auth_endpoint: format!("{}/auth", base),
            token_endpoint: format!("{}/token", base),
            revoke_endpoint: format!("{}/revoke", base),
            end_session_endpoint: format!("{}/logout", base),
            redirect_uri: redirect_uri.to_string(),
            post_logout_redirect_uri: post_logout_redirect_uri.to_string(),
            scopes,
        })
    }
}

/// OAuth token set. Held in process memory only.
#[derive(Clone, PartialEq, Eq, Zeroize)]
pub struct TokenSet {
    /// Access token for API requests
    pub access_token: String,
    /// Optional refresh token for token renewal
    pub refresh_token: Option<String>,
    /// Token expiration time as Unix timestamp
    pub expires_at: Option<u64>,
    /// OAuth scopes granted with this token
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl TokenSet {
    /// Create a new token set
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<u64>,
        scopes: Vec<String>,
    ) -> Self {
        let expires_at = expires_in
            .map(|seconds| unix_now() + seconds)
            .or_else(|| super::claims::decode_exp(&access_token));

        Self {
            access_token,
            refresh_token,
            expires_at,
            scopes,
        }
    }

    /// Check if the access token is expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => unix_now() >= expires_at,
            None => false,
        }
    }

    /// Check if the token expires within the specified duration
    pub fn expires_within(&self, duration: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= unix_now() + duration.as_secs(),
            None => false,
        }
    }

    /// Get time until token expiration
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| Duration::from_secs(expires_at.saturating_sub(unix_now())))
    }
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Authorization was denied by the provider or the user
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Network error talking to the identity provider
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid OAuth response
    #[error("Invalid OAuth response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// State parameter mismatch (CSRF protection)
    #[error("State mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: String, actual: String },

    /// Callback arrived without a login in progress
    #[error("No authorization in progress")]
    NoPendingAuthorization,

    /// No refresh token is held
    #[error("No refresh token available")]
    NoRefreshToken,

    /// Invalid token format
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Operation does not apply to the active backend
    #[error("Operation not supported by the {0} backend")]
    Unsupported(&'static str),
}
