//! Client context for the APIS server
//!
//! One [`ApisClient`] is built at startup and cloned into everything that
//! talks to the server. It owns the process-wide auth state: the cookie jar,
//! the memoized auth mode, the lazily-built token manager, the in-flight
//! refresh and the identity cache. Nothing here is global, so every test can
//! build a fresh context.
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use apis_sdk::{ClientBuilder, LoginOutcome, LoginRequest};
//!
//! # async fn example() -> apis_sdk::Result<()> {
//! let client = ClientBuilder::new()
//!     .base_url("http://localhost:3000")
//!     .build()?;
//!
//! let outcome = client
//!     .login(LoginRequest::Password {
//!         email: "keeper@example.com".into(),
//!         password: "correct horse".into(),
//!         remember_me: false,
//!     })
//!     .await?;
//!
//! if outcome.is_success() {
//!     let hives: serde_json::Value = client.get("/api/hives").await?;
//!     println!("{}", hives);
//! }
//! # Ok(())
//! # }
//! ```

use crate::auth::{
    cookies::CookieJar, csrf::CSRF_COOKIE_NAME, mode::ModeSelector, AuthBackend, AuthConfig,
    CheckResult, LoginOutcome, LoginRequest, SessionAuth, TokenAuth, TokenManager,
};
use crate::error::{ApiError, Result};
use crate::identity_cache::IdentityCache;
use crate::notify::{
    LoginReason, Navigator, Notification, Notifier, Redirect, TracingNavigator, TracingNotifier,
};
use crate::pipeline::SharedRefresh;
use crate::poll::{ManualRefresh, RefreshOutcome, RefreshState};
use crate::sanitize::sanitize;
use crate::types::{AuthMode, Identity, ServerAuthConfig, WhoAmI};
use apis_common::config::{AuthSettings, ClientConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default API URL when not specified
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Default timeout in seconds for API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default bound for manual refresh operations
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: Url,
    pub(crate) cookies: Arc<CookieJar>,
    pub(crate) mode: ModeSelector,
    pub(crate) tokens: Mutex<Option<Arc<TokenManager>>>,
    pub(crate) refresh: Mutex<Option<SharedRefresh>>,
    pub(crate) identity: IdentityCache,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) navigator: Arc<dyn Navigator>,
    // set by the first expiry, cleared by the next successful login
    pub(crate) expired: AtomicBool,
    pub(crate) settings: AuthSettings,
    pub(crate) insights: ManualRefresh<serde_json::Value>,
}

/// Handle to the client context. Cheap to clone.
#[derive(Clone)]
pub struct ApisClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl std::fmt::Debug for ApisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApisClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("mode", &self.inner.mode.cached_mode())
            .finish()
    }
}

impl ApisClient {
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid path {}: {}", path, e)))
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.inner.notifier.as_ref()
    }

    pub(crate) fn navigator(&self) -> &dyn Navigator {
        self.inner.navigator.as_ref()
    }

    pub(crate) fn identity_cache(&self) -> &IdentityCache {
        &self.inner.identity
    }

    /// Current CSRF token, if the server has issued one
    pub fn csrf_token(&self) -> Option<String> {
        self.inner
            .cookies
            .readable(&self.inner.base_url, CSRF_COOKIE_NAME)
    }

    // ===== Mode =====

    async fn fetch_auth_config(&self) -> Option<ServerAuthConfig> {
        let url = self.endpoint("/api/auth/config").ok()?;
        let response = match self.inner.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch auth configuration: {}", sanitize(&e.to_string()));
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Auth configuration request failed with {}", response.status());
            return None;
        }

        match response.json::<ServerAuthConfig>().await {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Auth configuration unreadable: {}", e);
                None
            }
        }
    }

    /// Server auth configuration, memoized after the first success. On a
    /// mode switch every piece of local credential state is discarded first.
    pub async fn auth_config(&self) -> Option<ServerAuthConfig> {
        let resolution = self
            .inner
            .mode
            .resolve(|| self.fetch_auth_config())
            .await;

        if resolution.switched_from.is_some() {
            self.clear_local_state();
        }
        resolution.config
    }

    /// Active auth mode; `None` while the server configuration is unavailable
    pub async fn auth_mode(&self) -> Option<AuthMode> {
        self.auth_config().await.map(|config| config.mode)
    }

    /// Forget the memoized mode
    pub fn invalidate_mode(&self) {
        self.inner.mode.invalidate();
    }

    // ===== Backends =====

    pub(crate) fn existing_token_manager(&self) -> Option<Arc<TokenManager>> {
        self.inner.tokens.lock().clone()
    }

    /// Token manager, built on first use from the server configuration
    pub(crate) async fn token_manager(&self) -> Result<Arc<TokenManager>> {
        let config = self.auth_config().await.ok_or(ApiError::ModeUnavailable)?;

        let mut slot = self.inner.tokens.lock();
        if let Some(manager) = slot.as_ref() {
            return Ok(manager.clone());
        }

        let settings = &self.inner.settings;
        let auth_config = AuthConfig::from_authority(
            config.keycloak_authority.as_deref().unwrap_or_default(),
            config.client_id.as_deref().unwrap_or_default(),
            &settings.redirect_uri,
            &settings.post_logout_redirect_uri,
            settings.scopes.clone(),
        )?;

        debug!("Constructing token manager for {}", auth_config.authority);
        let manager = TokenManager::new(
            auth_config,
            self.inner.http.clone(),
            Duration::from_secs(settings.renewal_margin_secs),
        );
        *slot = Some(manager.clone());
        Ok(manager)
    }

    /// Backend selected by the server for this process
    pub async fn backend(&self) -> Result<AuthBackend> {
        match self.auth_mode().await {
            Some(AuthMode::Session) => Ok(AuthBackend::Session(SessionAuth::new(self.clone()))),
            Some(AuthMode::Token) => {
                let manager = self.token_manager().await?;
                Ok(AuthBackend::Token(TokenAuth::new(self.clone(), manager)))
            }
            None => Err(ApiError::ModeUnavailable),
        }
    }

    // ===== Auth contract =====

    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome> {
        Ok(self.backend().await?.login(request).await)
    }

    /// Finish a token-mode login with the authorization callback parameters
    pub async fn complete_login(&self, code: &str, state: &str) -> Result<()> {
        match self.backend().await? {
            AuthBackend::Token(token) => token.complete_login(code, state).await,
            AuthBackend::Session(_) => Err(crate::auth::AuthError::Unsupported("session").into()),
        }
    }

    /// Sign out. Local state is always discarded.
    pub async fn logout(&self) {
        match self.backend().await {
            Ok(backend) => backend.logout().await,
            Err(e) => {
                debug!("Signing out without a backend: {}", e);
                self.clear_local_state();
                self.navigator().navigate(Redirect::Login {
                    reason: LoginReason::SignedOut,
                });
            }
        }
    }

    pub async fn check(&self) -> CheckResult {
        match self.backend().await {
            Ok(backend) => backend.check().await,
            Err(_) => CheckResult {
                authenticated: false,
                redirect_to: Some(Redirect::Login {
                    reason: LoginReason::Unauthenticated,
                }),
            },
        }
    }

    pub async fn who_am_i(&self) -> Option<WhoAmI> {
        self.backend().await.ok()?.who_am_i().await
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.backend().await.ok()?.identity().await
    }

    pub async fn permissions(&self) -> Vec<String> {
        match self.backend().await {
            Ok(backend) => backend.permissions().await,
            Err(_) => Vec::new(),
        }
    }

    /// Change the password of the signed-in user (session mode)
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
        match self.backend().await? {
            AuthBackend::Session(session) => {
                session.change_password(current_password, new_password).await
            }
            AuthBackend::Token(_) => Err(crate::auth::AuthError::Unsupported("token").into()),
        }
    }

    // ===== Manual refresh =====

    /// Ask the server to regenerate insights now. Bounded by the refresh
    /// timeout; a second call supersedes a running one.
    pub async fn refresh_insights(&self) -> RefreshOutcome<serde_json::Value> {
        let client = self.clone();
        self.inner
            .insights
            .run(move |_cancel| async move {
                client
                    .post_silent("/api/beebrain/refresh", &serde_json::json!({}))
                    .await
            })
            .await
    }

    pub fn insights_state(&self) -> RefreshState<serde_json::Value> {
        self.inner.insights.state()
    }

    // ===== Local state =====

    pub(crate) fn mark_authenticated(&self) {
        self.inner.expired.store(false, Ordering::SeqCst);
        self.inner.identity.invalidate();
    }

    /// Run expiry handling at most once per authenticated session. Returns
    /// whether this call performed the redirect.
    pub(crate) fn expire_session(&self, reason: LoginReason) -> bool {
        if self.inner.expired.swap(true, Ordering::SeqCst) {
            debug!("Session expiry already handled");
            return false;
        }

        info!("Session expired, discarding local credentials");
        self.clear_local_state();
        self.inner.mode.invalidate();
        self.navigator().navigate(Redirect::Login { reason });
        true
    }

    /// Discard cookies, tokens, the pending refresh and the cached identity
    pub fn clear_local_state(&self) {
        self.inner.cookies.clear();
        if let Some(manager) = self.inner.tokens.lock().take() {
            manager.clear();
        }
        self.inner.refresh.lock().take();
        self.inner.identity.invalidate();
        debug!("Local auth state cleared");
    }

    pub(crate) fn notify_error(&self, title: &str, error: &ApiError) {
        let message = sanitize(&error.to_string());
        warn!("{}: {}", title, message);
        self.notifier().notify(Notification::error(title, message));
    }
}

/// Builder for constructing an ApisClient with custom configuration
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    refresh_timeout: Option<Duration>,
    settings: Option<AuthSettings>,
    notifier: Option<Arc<dyn Notifier>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl ClientBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded from loaded configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new()
            .base_url(config.api.base_url.clone())
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .refresh_timeout(Duration::from_secs(config.refresh.timeout_secs))
            .auth_settings(config.auth.clone())
    }

    /// Set the base URL for the API
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound for manual refresh operations
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    pub fn auth_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApisClient> {
        let base_url = self.base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let base_url = Url::parse(&base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid base URL {}: {}", base_url, e)))?;
        let settings = self.settings.unwrap_or_default();

        let cookies = Arc::new(CookieJar::new());
        let http = reqwest::Client::builder()
            .timeout(
                self.timeout
                    .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            )
            .cookie_provider(cookies.clone())
            .build()
            .map_err(ApiError::Network)?;

        Ok(ApisClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                cookies,
                mode: ModeSelector::new(),
                tokens: Mutex::new(None),
                refresh: Mutex::new(None),
                identity: IdentityCache::new(Duration::from_millis(settings.identity_cache_ttl_ms)),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
                navigator: self.navigator.unwrap_or_else(|| Arc::new(TracingNavigator)),
                expired: AtomicBool::new(false),
                settings,
                insights: ManualRefresh::new(self.refresh_timeout.unwrap_or(DEFAULT_REFRESH_TIMEOUT)),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingNavigator;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_builder_rejects_invalid_base_url() {
        let err = ClientBuilder::new().base_url("not a url").build().unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[test]
    fn test_builder_from_config() {
        let mut config = ClientConfig::default();
        config.api.base_url = "https://apis.example.com".into();
        let client = ClientBuilder::from_config(&config).build().unwrap();
        assert_eq!(client.base_url().as_str(), "https://apis.example.com/");
    }

    #[tokio::test]
    async fn test_unreachable_config_leaves_mode_unknown() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/config"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let navigator = CollectingNavigator::new();
        let client = ClientBuilder::new()
            .base_url(mock_server.uri())
            .navigator(Arc::new(navigator.clone()))
            .build()
            .unwrap();

        assert_eq!(client.auth_mode().await, None);
        assert!(!client.check().await.authenticated);

        client.logout().await;
        assert_eq!(
            navigator.redirects(),
            vec![Redirect::Login {
                reason: LoginReason::SignedOut
            }]
        );
    }

    #[tokio::test]
    async fn test_token_manager_is_built_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "mode": "keycloak",
                "keycloak_authority": "https://kc.example.com/realms/honeybee",
                "client_id": "apis-dashboard",
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ClientBuilder::new().base_url(mock_server.uri()).build().unwrap();
        assert!(client.existing_token_manager().is_none());

        let first = client.token_manager().await.unwrap();
        let second = client.token_manager().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_expiry_handled_once_until_next_login() {
        let navigator = CollectingNavigator::new();
        let client = ClientBuilder::new()
            .navigator(Arc::new(navigator.clone()))
            .build()
            .unwrap();

        assert!(client.expire_session(LoginReason::SessionExpired));
        assert!(!client.expire_session(LoginReason::SessionExpired));
        assert_eq!(navigator.redirects().len(), 1);

        client.mark_authenticated();
        assert!(client.expire_session(LoginReason::SessionExpired));
        assert_eq!(navigator.redirects().len(), 2);
    }
}
