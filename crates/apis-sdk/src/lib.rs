//! # APIS SDK
//!
//! Authentication and request pipeline for the APIS hive-monitoring
//! dashboard server.
//!
//! The server runs in one of two auth modes, chosen per deployment:
//! - Session mode: HttpOnly session cookie, CSRF header on state-changing calls
//! - Token mode: bearer tokens from an external identity provider, renewed
//!   silently and held in memory only
//!
//! ## Architecture
//!
//! - [`ApisClient`] is an explicit context built once and cloned where needed
//! - The request pipeline attaches credentials for the active mode and
//!   retries a 401 at most once behind a single shared token refresh
//! - Errors carry an [`ErrorKind`] tag; everything shown to the user is
//!   sanitized first
//! - Notifications and navigation go through injected [`Notifier`] and
//!   [`Navigator`] implementations

pub mod auth;
pub mod client;
pub mod error;
pub mod identity_cache;
pub mod impersonation;
pub mod notify;
pub mod pipeline;
pub mod poll;
pub mod sanitize;
pub mod types;

pub use auth::{
    AuthBackend, AuthProvider, CheckResult, ErrorAction, LoginError, LoginOutcome, LoginRequest,
};
pub use client::{ApisClient, ClientBuilder};
pub use error::{ApiError, ErrorKind, Result};
pub use notify::{
    CollectingNavigator, CollectingNotifier, Level, LoginReason, Navigator, Notification,
    Notifier, Redirect,
};
pub use poll::{ManualRefresh, RefreshOutcome, RefreshState};
pub use sanitize::sanitize;
pub use types::{AuthMode, Identity, ImpersonationStatus, ServerAuthConfig, WhoAmI};
