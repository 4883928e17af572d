//! User-facing side effects: notifications and navigation
//!
//! The client never prints or navigates itself. Front ends inject a
//! [`Notifier`] and a [`Navigator`]; the defaults log through `tracing`.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// A message for the user. Text has already been sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Why the user is sent to the login page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReason {
    SignedOut,
    SessionExpired,
    Unauthenticated,
}

impl fmt::Display for LoginReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginReason::SignedOut => write!(f, "signed out"),
            LoginReason::SessionExpired => write!(f, "Your session has expired. Please log in again."),
            LoginReason::Unauthenticated => write!(f, "authentication required"),
        }
    }
}

/// Navigation the front end should perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Local login page
    Login { reason: LoginReason },
    /// Page outside the application (identity provider)
    External(String),
    /// Discard in-memory view state and start over
    Reload,
}

/// Channel for user-facing notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Receiver of navigation requests
pub trait Navigator: Send + Sync {
    fn navigate(&self, redirect: Redirect);
}

/// Logs notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Info => info!("{}: {}", notification.title, notification.message),
            Level::Warning => warn!("{}: {}", notification.title, notification.message),
            Level::Error => error!("{}: {}", notification.title, notification.message),
        }
    }
}

/// Logs navigation requests
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, redirect: Redirect) {
        match redirect {
            Redirect::Login { reason } => info!("Redirect to login ({})", reason),
            // may carry query parameters; log only the origin
            Redirect::External(url) => info!(
                "Redirect to {}",
                url::Url::parse(&url)
                    .map(|u| u.origin().ascii_serialization())
                    .unwrap_or_default()
            ),
            Redirect::Reload => info!("Reload requested"),
        }
    }
}

/// Records notifications, for embedding and tests
#[derive(Debug, Default, Clone)]
pub struct CollectingNotifier {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}

/// Records navigation requests, for embedding and tests
#[derive(Debug, Default, Clone)]
pub struct CollectingNavigator {
    seen: Arc<Mutex<Vec<Redirect>>>,
}

impl CollectingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirects(&self) -> Vec<Redirect> {
        self.seen.lock().clone()
    }
}

impl Navigator for CollectingNavigator {
    fn navigate(&self, redirect: Redirect) {
        self.seen.lock().push(redirect);
    }
}
