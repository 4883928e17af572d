//! Authentication for the APIS client
//!
//! This module provides the two authentication backends and what they share:
//! - Session backend: HttpOnly session cookie plus CSRF double-submit
//! - Token backend: OAuth 2.0 authorization code flow with PKCE against an
//!   external identity provider, tokens held in memory only
//! - Auth mode resolution from the server configuration
//! - Cookie jar that respects the HttpOnly attribute

pub mod claims;
pub mod cookies;
pub mod csrf;
pub mod manager;
pub mod mode;
pub mod oauth_flow;
pub mod provider;
pub mod session;
pub mod token;
pub mod types;

// Re-export commonly used types
pub use manager::TokenManager;
pub use provider::{
    AuthBackend, AuthProvider, CheckResult, ErrorAction, LoginError, LoginOutcome, LoginRequest,
};
pub use session::SessionAuth;
pub use token::TokenAuth;
pub use types::{AuthConfig, AuthError, AuthResult, TokenSet};
