//! Configuration management for the APIS dashboard client
//!
//! Values are layered with figment: built-in defaults, then an optional TOML
//! file, then `APIS_`-prefixed environment variables (`__` separates nested
//! keys, e.g. `APIS_API__BASE_URL`).

use etcetera::{choose_base_strategy, BaseStrategy};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to determine base directories: {0}")]
    Directories(String),
}

/// Client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClientConfig {
    /// API server configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Authentication behavior
    #[serde(default)]
    pub auth: AuthSettings,

    /// User-triggered refresh operations
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Base URL of the APIS server
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Authentication settings shared by both backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSettings {
    /// Redirect URI registered with the identity provider
    pub redirect_uri: String,

    /// Where the identity provider sends the browser after sign-out
    pub post_logout_redirect_uri: String,

    /// OAuth scopes requested during authorization
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Renew access tokens this many seconds before they expire
    #[serde(default = "default_renewal_margin")]
    pub renewal_margin_secs: u64,

    /// How long a resolved identity is reused by concurrent checks
    #[serde(default = "default_identity_cache_ttl")]
    pub identity_cache_ttl_ms: u64,

    /// Timeout for the loopback authorization callback in seconds
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            redirect_uri: "http://localhost:5173/callback".to_string(),
            post_logout_redirect_uri: "http://localhost:5173/login".to_string(),
            scopes: default_scopes(),
            renewal_margin_secs: default_renewal_margin(),
            identity_cache_ttl_ms: default_identity_cache_ttl(),
            callback_timeout_secs: default_callback_timeout(),
        }
    }
}

/// Bounds for user-triggered refresh-and-poll operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshConfig {
    /// Maximum wait for a manual refresh in seconds
    #[serde(default = "default_refresh_timeout")]
    pub timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_refresh_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "profile".to_string(),
        "email".to_string(),
    ]
}

fn default_renewal_margin() -> u64 {
    60
}

fn default_identity_cache_ttl() -> u64 {
    2_000
}

fn default_callback_timeout() -> u64 {
    300
}

fn default_refresh_timeout() -> u64 {
    10
}

impl ClientConfig {
    /// Environment variable prefix for overrides
    pub const ENV_PREFIX: &'static str = "APIS_";

    /// Load configuration from the default location
    pub fn load_default() -> Result<Self, ConfigurationError> {
        let path = Self::default_path()?;
        Self::load(Some(&path))
    }

    /// Load configuration, layering an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            debug!("Loading configuration from: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        let config: Self = figment
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the client cannot run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let base = Url::parse(&self.api.base_url).map_err(|e| ConfigurationError::InvalidValue {
            key: "api.base_url".to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigurationError::InvalidValue {
                key: "api.base_url".to_string(),
                reason: format!("unsupported scheme '{}'", base.scheme()),
            });
        }

        if self.api.timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "api.timeout_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.refresh.timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                key: "refresh.timeout_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Get configuration directory
    pub fn config_dir() -> Result<PathBuf, ConfigurationError> {
        let strategy =
            choose_base_strategy().map_err(|e| ConfigurationError::Directories(e.to_string()))?;
        Ok(strategy.config_dir().join("apis"))
    }

    /// Default configuration file path
    pub fn default_path() -> Result<PathBuf, ConfigurationError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth.identity_cache_ttl_ms, 2_000);
        assert_eq!(config.refresh.timeout_secs, 10);
    }

    #[test]
    fn test_file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [api]
                base_url = "https://apis.example.com"
                timeout_secs = 12

                [auth]
                redirect_uri = "https://apis.example.com/callback"
                post_logout_redirect_uri = "https://apis.example.com/login"
                "#,
            )?;
            jail.set_env("APIS_AUTH__RENEWAL_MARGIN_SECS", "90");

            let config = ClientConfig::load(Some(Path::new("config.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.api.base_url, "https://apis.example.com");
            assert_eq!(config.api.timeout_secs, 12);
            assert_eq!(config.auth.renewal_margin_secs, 90);
            assert_eq!(config.auth.scopes, default_scopes());
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        Jail::expect_with(|_jail| {
            let config = ClientConfig::load(Some(Path::new("absent.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config, ClientConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_rejects_zero_timeout() {
        Jail::expect_with(|jail| {
            jail.set_env("APIS_API__TIMEOUT_SECS", "0");
            let err = ClientConfig::load(None).unwrap_err();
            assert!(matches!(err, ConfigurationError::InvalidValue { ref key, .. } if key == "api.timeout_secs"));
            Ok(())
        });
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let mut config = ClientConfig::default();
        config.api.base_url = "ftp://apis.example.com".to_string();
        assert!(config.validate().is_err());
    }
}
