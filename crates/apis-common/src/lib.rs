//! Shared building blocks for the APIS dashboard client crates
//!
//! - [`config`]: layered client configuration (defaults, TOML file, environment)
//! - [`logging`]: tracing subscriber initialization for binaries

pub mod config;
pub mod logging;

pub use config::{ApiConfig, AuthSettings, ClientConfig, ConfigurationError, RefreshConfig};
