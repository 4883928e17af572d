//! Token management for the identity-provider backend
//!
//! The TokenManager owns the access/refresh token pair. Tokens live in
//! process memory only: nothing is written to disk, so a new process starts
//! signed out. A background task renews the access token shortly before it
//! expires.

use super::claims::{self, TokenClaims};
use super::oauth_flow::{OAuthFlow, PendingAuthorization};
use super::types::{AuthConfig, AuthError, AuthResult, TokenSet};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

/// Scheduled background renewal with its cancellation token
type RenewalTask = (tokio::task::JoinHandle<()>, CancellationToken);

/// Token cache; secrets are wiped when replaced or cleared
#[derive(Default)]
struct TokenCache {
    token_set: Option<TokenSet>,
}

impl TokenCache {
    fn get(&self) -> Option<&TokenSet> {
        self.token_set.as_ref()
    }

    fn set(&mut self, token_set: TokenSet) {
        if let Some(mut old) = self.token_set.replace(token_set) {
            old.zeroize();
        }
    }

    fn clear(&mut self) {
        if let Some(mut old) = self.token_set.take() {
            old.zeroize();
        }
    }
}

/// Shortest wait between a token being stored and its proactive renewal
const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(5);

/// How long to wait before renewing proactively. `None` when the token
/// carries no expiry.
///
/// Renews `margin` ahead of expiry. A token that lives no longer than the
/// margin is renewed halfway through its remaining lifetime instead, and
/// no renewal runs sooner than [`MIN_RENEWAL_DELAY`].
fn renewal_delay(token_set: &TokenSet, margin: Duration) -> Option<Duration> {
    let remaining = token_set.time_until_expiry()?;
    let delay = if remaining > margin {
        remaining - margin
    } else {
        remaining / 2
    };
    Some(delay.max(MIN_RENEWAL_DELAY))
}

/// Manages the in-memory token pair for the identity-provider backend
pub struct TokenManager {
    flow: OAuthFlow,
    cache: RwLock<TokenCache>,
    pending: Mutex<Option<PendingAuthorization>>,
    renewal: Mutex<Option<RenewalTask>>,
    renewal_margin: Duration,
    // bumped on clear; a renewal started before a clear must not store its result
    generation: AtomicU64,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("client_id", &self.flow.config().client_id)
            .field("authenticated", &self.access_token().is_some())
            .finish()
    }
}

impl TokenManager {
    /// Create a manager with no tokens
    pub fn new(config: AuthConfig, http: reqwest::Client, renewal_margin: Duration) -> Arc<Self> {
        Arc::new(Self {
            flow: OAuthFlow::new(config, http),
            cache: RwLock::new(TokenCache::default()),
            pending: Mutex::new(None),
            renewal: Mutex::new(None),
            renewal_margin,
            generation: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        self.flow.config()
    }

    /// Start an authorization; returns the URL the user must visit
    pub fn begin_authorization(&self) -> AuthResult<String> {
        let (url, pending) = self.flow.build_auth_url()?;
        if let Some(mut stale) = self.pending.lock().replace(pending) {
            stale.zeroize();
        }
        info!("Authorization started with {}", self.flow.config().authority);
        Ok(url)
    }

    /// Finish an authorization with the code and state from the callback
    pub async fn complete_authorization(self: &Arc<Self>, code: &str, state: &str) -> AuthResult<()> {
        let Some(mut pending) = self.pending.lock().take() else {
            return Err(AuthError::NoPendingAuthorization);
        };

        if pending.state != state {
            let expected = std::mem::take(&mut pending.state);
            pending.zeroize();
            return Err(AuthError::StateMismatch {
                expected,
                actual: state.to_string(),
            });
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let result = self.flow.exchange_code(code, &pending.code_verifier).await;
        pending.zeroize();

        let token_set = result?;
        self.store(token_set, generation)?;
        info!("Signed in with identity provider");
        Ok(())
    }

    /// Current access token, if one is held and not expired
    pub fn access_token(&self) -> Option<String> {
        self.cache
            .read()
            .get()
            .filter(|tokens| !tokens.is_expired())
            .map(|tokens| tokens.access_token.clone())
    }

    /// Claims of the current access token
    pub fn claims(&self) -> Option<TokenClaims> {
        let cache = self.cache.read();
        let tokens = cache.get().filter(|tokens| !tokens.is_expired())?;
        match claims::decode(&tokens.access_token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                warn!("Access token claims unreadable: {}", e);
                None
            }
        }
    }

    /// Obtain a new access token with the refresh token. On failure the
    /// held tokens are discarded.
    pub async fn renew(self: &Arc<Self>) -> AuthResult<String> {
        match self.refresh_tokens().await {
            Ok(access_token) => Ok(access_token),
            Err(e) => {
                warn!("Token renewal failed, discarding tokens: {}", e);
                self.cache.write().clear();
                Err(e)
            }
        }
    }

    async fn refresh_tokens(self: &Arc<Self>) -> AuthResult<String> {
        let generation = self.generation.load(Ordering::SeqCst);
        let refresh_token = self
            .cache
            .read()
            .get()
            .and_then(|tokens| tokens.refresh_token.clone())
            .ok_or(AuthError::NoRefreshToken)?;

        let mut refresh_token = refresh_token;
        let result = self.flow.refresh(&refresh_token).await;
        refresh_token.zeroize();

        let token_set = result?;
        let access_token = token_set.access_token.clone();
        self.store(token_set, generation)?;
        Ok(access_token)
    }

    fn store(self: &Arc<Self>, token_set: TokenSet, generation: u64) -> AuthResult<()> {
        if self.generation.load(Ordering::SeqCst) != generation {
            let mut token_set = token_set;
            token_set.zeroize();
            return Err(AuthError::AuthorizationDenied(
                "tokens were cleared while the request was in flight".to_string(),
            ));
        }

        let delay = renewal_delay(&token_set, self.renewal_margin);
        let renewable = token_set.refresh_token.is_some();
        self.cache.write().set(token_set);

        if let (Some(delay), true) = (delay, renewable) {
            self.schedule_renewal(delay);
        }
        Ok(())
    }

    fn schedule_renewal(self: &Arc<Self>, delay: Duration) {
        debug!("Scheduling token renewal in {:?}", delay);

        let weak: Weak<Self> = Arc::downgrade(self);
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {
                    debug!("Scheduled token renewal cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let Some(manager) = weak.upgrade() else {
                        return;
                    };
                    match manager.refresh_tokens().await {
                        Ok(_) => info!("Access token renewed ahead of expiry"),
                        Err(e) => warn!("Background token renewal failed: {}", e),
                    }
                }
            }
        });

        if let Some((_, previous)) = self.renewal.lock().replace((handle, token)) {
            previous.cancel();
        }
    }

    /// Revoke the held grant at the provider. Prefers the refresh token,
    /// which revokes the whole grant.
    pub async fn revoke(&self) -> AuthResult<()> {
        let target = self.cache.read().get().map(|tokens| match &tokens.refresh_token {
            Some(refresh) => (refresh.clone(), "refresh_token"),
            None => (tokens.access_token.clone(), "access_token"),
        });

        let Some((mut token, hint)) = target else {
            return Ok(());
        };
        let result = self.flow.revoke(&token, hint).await;
        token.zeroize();
        result
    }

    /// Discard tokens, the pending authorization and the renewal task
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.write().clear();
        if let Some(mut pending) = self.pending.lock().take() {
            pending.zeroize();
        }
        if let Some((handle, token)) = self.renewal.lock().take() {
            token.cancel();
            handle.abort();
        }
        debug!("Token state cleared");
    }

    /// Provider sign-out URL
    pub fn end_session_url(&self) -> AuthResult<String> {
        self.flow.end_session_url()
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        if let Some((handle, token)) = self.renewal.get_mut().take() {
            token.cancel();
            handle.abort();
        }
        self.cache.get_mut().clear();
    }
}
