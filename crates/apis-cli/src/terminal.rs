//! Terminal implementations of the client's notification and navigation hooks

use crate::output::{print_error, print_info, print_link, print_warning};
use apis_sdk::{Level, LoginReason, Navigator, Notification, Notifier, Redirect};
use tracing::debug;

/// Prints notifications to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notification: Notification) {
        let line = format!("{}: {}", notification.title, notification.message);
        match notification.level {
            Level::Error => print_error(&line),
            Level::Warning => print_warning(&line),
            Level::Info => print_info(&line),
        }
    }
}

/// Opens external pages in the browser and reports the rest
#[derive(Debug, Clone, Copy)]
pub struct TerminalNavigator {
    open_browser: bool,
}

impl TerminalNavigator {
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, redirect: Redirect) {
        match redirect {
            Redirect::External(url) => {
                print_link("Continue in your browser", &url);
                if self.open_browser {
                    if let Err(e) = webbrowser::open(&url) {
                        debug!("Could not open a browser: {}", e);
                        print_warning("Could not open a browser, visit the link above");
                    }
                }
            }
            Redirect::Login {
                reason: LoginReason::SignedOut,
            } => print_info("Signed out"),
            Redirect::Login { reason } => print_warning(&reason.to_string()),
            Redirect::Reload => print_info("Tenant context changed"),
        }
    }
}
