//! Sign-in and account command handlers

use crate::auth::CallbackServer;
use crate::cli::args::Session;
use crate::error::{CliError, Result};
use crate::output::{json_output, print_info, print_success, table_output};
use apis_sdk::{ApiError, AuthMode, LoginOutcome, LoginRequest, WhoAmI};
use dialoguer::{theme::ColorfulTheme, Input, Password};
use std::time::Duration;
use tracing::debug;

fn prompt_email(session: &Session) -> Result<String> {
    if let Some(email) = &session.email {
        return Ok(email.clone());
    }
    Ok(Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt("Email")
        .interact_text()?)
}

fn prompt_password(prompt: &str) -> Result<String> {
    Ok(Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()?)
}

async fn password_sign_in(session: &Session) -> Result<()> {
    let email = prompt_email(session)?;
    let password = match &session.password {
        Some(password) => password.clone(),
        None => prompt_password("Password")?,
    };

    let request = LoginRequest::Password {
        email,
        password,
        remember_me: false,
    };
    match session.client.login(request).await? {
        LoginOutcome::Failed(e) => Err(e.into()),
        _ => Ok(()),
    }
}

async fn browser_sign_in(session: &Session) -> Result<()> {
    let settings = &session.config.auth;
    // listen before the browser can come back
    let server = CallbackServer::bind(
        &settings.redirect_uri,
        Duration::from_secs(settings.callback_timeout_secs),
    )
    .await?;

    match session.client.login(LoginRequest::Redirect).await? {
        LoginOutcome::Redirected { .. } => {}
        LoginOutcome::Authenticated(_) => return Ok(()),
        LoginOutcome::Failed(e) => return Err(e.into()),
    }

    print_info("Waiting for the browser sign-in to complete...");
    let callback = server.wait().await?;
    session
        .client
        .complete_login(&callback.code, &callback.state)
        .await?;
    Ok(())
}

/// Sign in the way the server asks for; returns who we are
pub async fn establish_session(session: &Session) -> Result<WhoAmI> {
    match session.client.auth_mode().await {
        Some(AuthMode::Session) => password_sign_in(session).await?,
        Some(AuthMode::Token) => browser_sign_in(session).await?,
        None => return Err(ApiError::ModeUnavailable.into()),
    }

    let who = session
        .client
        .who_am_i()
        .await
        .ok_or(CliError::Api(ApiError::SessionExpired))?;
    debug!("Signed in to tenant {}", who.identity.tenant_id);
    Ok(who)
}

/// Handle mode command
pub async fn handle_mode(session: &Session) -> Result<()> {
    let config = session
        .client
        .auth_config()
        .await
        .ok_or(CliError::Api(ApiError::ModeUnavailable))?;

    if session.json {
        return json_output(&config);
    }

    match config.mode {
        AuthMode::Session => print_info("Server signs in with email and password"),
        AuthMode::Token => print_info(&format!(
            "Server signs in through {}",
            config.keycloak_authority.as_deref().unwrap_or("an identity provider")
        )),
    }
    if config.setup_required == Some(true) {
        print_info("Server setup has not been completed yet");
    }
    Ok(())
}

/// Handle whoami command
pub async fn handle_whoami(session: &Session) -> Result<()> {
    let who = establish_session(session).await?;

    if session.json {
        return json_output(&who);
    }
    println!("{}", table_output::identity_table(&who));
    Ok(())
}

/// Handle change-password command
pub async fn handle_change_password(session: &Session) -> Result<()> {
    establish_session(session).await?;

    let current = match &session.password {
        Some(password) => password.clone(),
        None => prompt_password("Current password")?,
    };
    let new_password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("New password")
        .with_confirmation("Confirm new password", "Passwords do not match")
        .interact()?;

    session
        .client
        .change_password(&current, &new_password)
        .await?;
    print_success("Password changed");
    Ok(())
}

/// Handle logout command. Nothing is held between runs: in session mode we
/// sign in first so the server session behind these credentials is ended.
/// In token mode the provider session lives in the browser, which is sent
/// to the sign-out page.
pub async fn handle_logout(session: &Session) -> Result<()> {
    match session.client.auth_mode().await {
        Some(AuthMode::Session) => {
            establish_session(session).await?;
            session.client.logout().await;
            print_success("Signed out of the server session");
        }
        Some(AuthMode::Token) => session.client.logout().await,
        None => return Err(ApiError::ModeUnavailable.into()),
    }
    Ok(())
}
