//! Error types for the APIS CLI

use color_eyre::eyre::Report;
use thiserror::Error;

/// CLI error type with minimal variants
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file issues
    #[error("Configuration error: {0}")]
    Config(#[from] apis_common::ConfigurationError),

    /// API communication errors
    #[error(transparent)]
    Api(#[from] apis_sdk::ApiError),

    /// Sign-in did not complete
    #[error("Sign-in failed: {0}")]
    Login(#[from] apis_sdk::LoginError),

    /// Browser callback problems
    #[error("Sign-in callback failed: {0}")]
    Callback(String),

    /// Interactive prompt failures
    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// Everything else (using color-eyre's Report for rich errors)
    #[error(transparent)]
    Internal(#[from] Report),
}

impl CliError {
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
