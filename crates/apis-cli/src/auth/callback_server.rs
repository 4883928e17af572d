//! Local HTTP callback server for the browser sign-in
//!
//! The identity provider redirects the browser to the configured redirect
//! URI, which must point at a loopback address. This server listens there
//! for exactly one callback and hands the code and state back to the CLI.

use crate::error::{CliError, Result};
use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

/// Authorization callback parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackData {
    pub code: String,
    pub state: String,
}

/// Query parameters from the provider redirect
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

type CallbackResult = std::result::Result<CallbackData, String>;

#[derive(Debug)]
struct CallbackState {
    sender: mpsc::Sender<CallbackResult>,
}

/// Loopback listener bound before the browser is opened
pub struct CallbackServer {
    listener: TcpListener,
    path: String,
    timeout: Duration,
}

impl CallbackServer {
    /// Bind the loopback address named by the redirect URI
    pub async fn bind(redirect_uri: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| CliError::callback(format!("invalid redirect URI {}: {}", redirect_uri, e)))?;

        let host = match url.host_str() {
            Some("localhost") | Some("127.0.0.1") => [127, 0, 0, 1],
            other => {
                return Err(CliError::callback(format!(
                    "redirect URI must point at localhost, got {:?}",
                    other
                )))
            }
        };
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = SocketAddr::from((host, port));

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CliError::callback(format!("Failed to bind to {}: {}", addr, e)))?;

        Ok(Self {
            listener,
            path: url.path().to_string(),
            timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| CliError::callback(e.to_string()))
    }

    /// Serve until one callback arrives or the timeout elapses
    pub async fn wait(self) -> Result<CallbackData> {
        let (sender, mut receiver) = mpsc::channel(1);
        let state = Arc::new(CallbackState { sender });

        let app = Router::new()
            .route(&self.path, get(handle_callback))
            .with_state(state);

        if let Ok(addr) = self.listener.local_addr() {
            info!("Sign-in callback server listening on http://{}{}", addr, self.path);
        }

        let server_handle = tokio::spawn(async move { axum::serve(self.listener, app).await });

        let result = tokio::select! {
            received = receiver.recv() => match received {
                Some(Ok(data)) => Ok(data),
                Some(Err(message)) => Err(CliError::callback(message)),
                None => Err(CliError::callback("Channel closed unexpectedly")),
            },
            _ = tokio::time::sleep(self.timeout) => {
                Err(CliError::callback("Timed out waiting for the browser sign-in"))
            }
        };

        server_handle.abort();
        result
    }
}

async fn handle_callback(
    Query(params): Query<CallbackQuery>,
    State(state): State<Arc<CallbackState>>,
) -> Html<String> {
    if let Some(error) = params.error {
        let message = params.error_description.unwrap_or(error);
        debug!("Provider returned an error to the callback");
        let page = error_page(&message);
        let _ = state.sender.try_send(Err(message));
        return Html(page);
    }

    match (params.code, params.state) {
        (Some(code), Some(callback_state)) => {
            let _ = state.sender.try_send(Ok(CallbackData {
                code,
                state: callback_state,
            }));
            Html(success_page())
        }
        (None, _) => Html(error_page("Missing authorization code")),
        (_, None) => Html(error_page("Missing state parameter")),
    }
}

const PAGE_STYLE: &str = r#"
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #fdf6e3;
            display: flex;
            justify-content: center;
            align-items: center;
            min-height: 100vh;
            margin: 0;
            color: #3b2f0b;
        }
        .container { text-align: center; padding: 3rem; }
        .details { font-family: monospace; word-break: break-word; }
"#;

fn success_page() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Signed in to APIS</title>
    <style>{}</style>
</head>
<body>
    <div class="container">
        <h1>Signed in</h1>
        <p>You can close this window and return to the terminal.</p>
    </div>
</body>
</html>"#,
        PAGE_STYLE
    )
}

fn error_page(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Sign-in failed</title>
    <style>{}</style>
</head>
<body>
    <div class="container">
        <h1>Sign-in failed</h1>
        <p class="details">{}</p>
        <p>Close this window and try again from the terminal.</p>
    </div>
</body>
</html>"#,
        PAGE_STYLE,
        escape_html(error)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
