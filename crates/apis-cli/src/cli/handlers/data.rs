//! Data command handlers

use super::auth::establish_session;
use crate::cli::args::Session;
use crate::error::{CliError, Result};
use crate::output::{json_output, print_success, print_warning};
use apis_sdk::{ApiError, RefreshOutcome};
use color_eyre::eyre::eyre;

/// Handle get command
pub async fn handle_get(session: &Session, path: &str) -> Result<()> {
    establish_session(session).await?;

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let value: serde_json::Value = session.client.get(&path).await?;
    json_output(&value)
}

/// Handle refresh-insights command
pub async fn handle_refresh_insights(session: &Session) -> Result<()> {
    establish_session(session).await?;

    match session.client.refresh_insights().await {
        RefreshOutcome::Completed(value) => {
            if session.json {
                return json_output(&value);
            }
            print_success("Insights refreshed");
            Ok(())
        }
        RefreshOutcome::TimedOut => {
            print_warning("Insights refresh timed out, run the command again to retry");
            Err(ApiError::Timeout.into())
        }
        RefreshOutcome::Failed(message) => {
            Err(CliError::Internal(eyre!("Insights refresh failed: {}", message)))
        }
        RefreshOutcome::Superseded => Err(ApiError::Cancelled.into()),
    }
}
