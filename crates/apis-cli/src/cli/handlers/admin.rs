//! Administrative command handlers

use super::auth::establish_session;
use crate::cli::args::Session;
use crate::error::Result;
use crate::output::{json_output, print_success, table_output};
use apis_sdk::ImpersonationStatus;

fn show(session: &Session, status: &ImpersonationStatus) -> Result<()> {
    if session.json {
        return json_output(status);
    }
    println!("{}", table_output::impersonation_table(status));
    Ok(())
}

/// Handle impersonate command
pub async fn handle_impersonate(session: &Session, tenant_id: &str, reason: Option<&str>) -> Result<()> {
    establish_session(session).await?;

    let status = session.client.impersonate(tenant_id, reason).await?;
    if !session.json {
        print_success(&format!(
            "Now acting within {}",
            status.tenant_name.as_deref().unwrap_or(tenant_id)
        ));
    }
    show(session, &status)
}

/// Handle stop-impersonation command
pub async fn handle_stop_impersonation(session: &Session) -> Result<()> {
    establish_session(session).await?;

    let status = session.client.stop_impersonation().await?;
    if !session.json {
        print_success("Returned to your own tenant");
    }
    show(session, &status)
}

/// Handle impersonation-status command
pub async fn handle_impersonation_status(session: &Session) -> Result<()> {
    establish_session(session).await?;

    let status = session.client.impersonation_status().await?;
    show(session, &status)
}
