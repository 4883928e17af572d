use crate::cli::{commands::Commands, handlers};
use crate::error::Result;
use crate::terminal::{TerminalNavigator, TerminalNotifier};
use apis_common::ClientConfig;
use apis_sdk::{ApisClient, ClientBuilder};
use clap::Parser;
use clap_verbosity_flag::{OffLevel, Verbosity};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Password read from the environment instead of prompting
const PASSWORD_ENV: &str = "APIS_PASSWORD";

/// APIS CLI - hive-monitoring dashboard client
#[derive(Parser, Debug)]
#[command(
    name = "apis",
    author = "APIS Team",
    version,
    about = "APIS CLI - hive-monitoring dashboard client",
    long_about = "Command-line client for the APIS hive-monitoring dashboard.

Every command signs in first; credentials are kept in memory only.

EXAMPLES:
  apis mode                         # Which sign-in the server expects
  apis whoami                       # Sign in and show your identity
  apis get /api/hives               # Fetch any API path as JSON
  apis impersonate <tenant_id>      # Act within another tenant (admin)
  apis refresh-insights             # Regenerate insights now"
)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Server URL, overrides the configuration
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Email for session-mode sign-in
    #[arg(long, global = true, env = "APIS_EMAIL")]
    pub email: Option<String>,

    /// Print the sign-in link instead of opening a browser
    #[arg(long, global = true)]
    pub no_browser: bool,

    /// Output format as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub verbosity: Verbosity<OffLevel>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// What every handler needs
pub struct Session {
    pub client: ApisClient,
    pub config: ClientConfig,
    pub email: Option<String>,
    /// Session-mode password taken from the environment, if any
    pub password: Option<String>,
    pub json: bool,
}

impl Args {
    fn load_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(Some(path))?,
            None => ClientConfig::load_default()?,
        };

        if let Some(url) = &self.api_url {
            config.api.base_url = url.clone();
            config.validate()?;
        }

        debug!("Using server {}", config.api.base_url);
        Ok(config)
    }

    fn build_session(&self) -> Result<Session> {
        let config = self.load_config()?;
        let client = ClientBuilder::from_config(&config)
            .notifier(Arc::new(TerminalNotifier))
            .navigator(Arc::new(TerminalNavigator::new(!self.no_browser)))
            .build()?;

        Ok(Session {
            client,
            config,
            email: self.email.clone(),
            password: std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty()),
            json: self.json,
        })
    }

    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let session = self.build_session()?;

        match self.command {
            Commands::Mode => handlers::auth::handle_mode(&session).await,
            Commands::Whoami => handlers::auth::handle_whoami(&session).await,
            Commands::ChangePassword => handlers::auth::handle_change_password(&session).await,
            Commands::Logout => handlers::auth::handle_logout(&session).await,

            Commands::Get { path } => handlers::data::handle_get(&session, &path).await,
            Commands::RefreshInsights => handlers::data::handle_refresh_insights(&session).await,

            Commands::Impersonate { tenant_id, reason } => {
                handlers::admin::handle_impersonate(&session, &tenant_id, reason.as_deref()).await
            }
            Commands::StopImpersonation => handlers::admin::handle_stop_impersonation(&session).await,
            Commands::ImpersonationStatus => {
                handlers::admin::handle_impersonation_status(&session).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parses_impersonate_with_reason() {
        let args = Args::parse_from([
            "apis",
            "impersonate",
            "tenant-42",
            "--reason",
            "support ticket",
            "--json",
        ]);
        assert!(args.json);
        match args.command {
            Commands::Impersonate { tenant_id, reason } => {
                assert_eq!(tenant_id, "tenant-42");
                assert_eq!(reason.as_deref(), Some("support ticket"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_api_url_override_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nbase_url = \"http://localhost:3000\"\n").unwrap();

        let args = Args::parse_from([
            "apis",
            "--config",
            path.to_str().unwrap(),
            "--api-url",
            "not a url",
            "mode",
        ]);
        assert!(args.load_config().is_err());

        let args = Args::parse_from([
            "apis",
            "--config",
            path.to_str().unwrap(),
            "--api-url",
            "https://apis.example.com",
            "mode",
        ]);
        assert_eq!(args.load_config().unwrap().api.base_url, "https://apis.example.com");
    }
}
