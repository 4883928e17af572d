//! Auth mode resolution
//!
//! The server decides which backend a deployment uses. The answer is
//! memoized after the first successful fetch; a failed fetch is not
//! memoized and resolves to "unknown".

use crate::types::{AuthMode, ServerAuthConfig};
use parking_lot::RwLock;
use std::future::Future;
use tracing::{debug, info, warn};

/// Result of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Server configuration, `None` when it could not be fetched
    pub config: Option<ServerAuthConfig>,
    /// Mode previously in use, set when the deployment switched modes
    pub switched_from: Option<AuthMode>,
}

impl Resolution {
    pub fn mode(&self) -> Option<AuthMode> {
        self.config.as_ref().map(|c| c.mode)
    }
}

/// Memoizing mode selector
#[derive(Debug, Default)]
pub struct ModeSelector {
    memo: RwLock<Option<ServerAuthConfig>>,
    // survives invalidate() so a switch can be detected on re-resolution
    last_mode: RwLock<Option<AuthMode>>,
    fetch_gate: tokio::sync::Mutex<()>,
}

impl ModeSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized configuration, without fetching
    pub fn cached(&self) -> Option<ServerAuthConfig> {
        self.memo.read().clone()
    }

    /// Memoized mode, without fetching
    pub fn cached_mode(&self) -> Option<AuthMode> {
        self.memo.read().as_ref().map(|c| c.mode)
    }

    /// Resolve the mode, fetching through `fetch` only if nothing is memoized.
    /// Concurrent callers share one fetch.
    pub async fn resolve<F, Fut>(&self, fetch: F) -> Resolution
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<ServerAuthConfig>>,
    {
        if let Some(config) = self.cached() {
            return Resolution {
                config: Some(config),
                switched_from: None,
            };
        }

        let _gate = self.fetch_gate.lock().await;
        // another caller may have resolved while we waited
        if let Some(config) = self.cached() {
            return Resolution {
                config: Some(config),
                switched_from: None,
            };
        }

        let Some(config) = fetch().await else {
            warn!("Auth configuration unavailable, continuing with unknown mode");
            return Resolution {
                config: None,
                switched_from: None,
            };
        };

        let previous = self.last_mode.write().replace(config.mode);
        let switched_from = previous.filter(|p| *p != config.mode);
        if let Some(old) = switched_from {
            info!("Auth mode switched from {} to {}", old, config.mode);
        } else {
            debug!("Auth mode resolved: {}", config.mode);
        }

        *self.memo.write() = Some(config.clone());
        Resolution {
            config: Some(config),
            switched_from,
        }
    }

    /// Forget the memoized configuration; the next request re-resolves
    pub fn invalidate(&self) {
        if self.memo.write().take().is_some() {
            debug!("Auth mode memo invalidated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(mode: AuthMode) -> ServerAuthConfig {
        ServerAuthConfig {
            mode,
            setup_required: None,
            keycloak_authority: None,
            client_id: None,
        }
    }

    #[tokio::test]
    async fn test_resolution_is_memoized() {
        let selector = ModeSelector::new();
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            let resolution = selector
                .resolve(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Some(config(AuthMode::Session))
                })
                .await;
            assert_eq!(resolution.mode(), Some(AuthMode::Session));
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_memoized() {
        let selector = ModeSelector::new();
        let unknown = selector.resolve(|| async { None }).await;
        assert_eq!(unknown.mode(), None);

        let resolved = selector
            .resolve(|| async { Some(config(AuthMode::Token)) })
            .await;
        assert_eq!(resolved.mode(), Some(AuthMode::Token));
        assert_eq!(resolved.switched_from, None);
    }

    #[tokio::test]
    async fn test_invalidate_detects_switch() {
        let selector = ModeSelector::new();
        selector
            .resolve(|| async { Some(config(AuthMode::Session)) })
            .await;

        selector.invalidate();
        assert_eq!(selector.cached_mode(), None);

        let resolution = selector
            .resolve(|| async { Some(config(AuthMode::Token)) })
            .await;
        assert_eq!(resolution.switched_from, Some(AuthMode::Session));
        assert_eq!(selector.cached_mode(), Some(AuthMode::Token));
    }
}
