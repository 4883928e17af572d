//! OAuth 2.0 authorization code flow with PKCE against the identity provider
//!
//! Builds the authorization URL, exchanges the returned code, renews with
//! the refresh token and revokes. Holds no tokens itself.

use super::types::{AuthConfig, AuthError, AuthResult, TokenSet};
use oauth2::{
    basic::{BasicClient, BasicErrorResponse, BasicTokenResponse},
    reqwest::async_http_client,
    AuthUrl, AuthorizationCode, ClientId, CsrfToken, PkceCodeChallenge, PkceCodeVerifier,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, info};
use url::Url;
use zeroize::Zeroize;

/// Verifier and state of an authorization that has been started but not completed
#[derive(Clone, PartialEq, Eq, Zeroize)]
pub struct PendingAuthorization {
    pub code_verifier: String,
    pub state: String,
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("code_verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// OAuth flow bound to one identity-provider configuration
#[derive(Debug, Clone)]
pub struct OAuthFlow {
    config: AuthConfig,
    http: reqwest::Client,
}

fn token_error<RE>(context: &str, err: RequestTokenError<RE, BasicErrorResponse>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => AuthError::AuthorizationDenied(format!(
            "{}: {}",
            context,
            response.error().as_ref()
        )),
        RequestTokenError::Request(e) => AuthError::NetworkError(format!("{}: {}", context, e)),
        RequestTokenError::Parse(e, _) => {
            AuthError::InvalidResponse(format!("{}: {}", context, e))
        }
        RequestTokenError::Other(message) => {
            AuthError::InvalidResponse(format!("{}: {}", context, message))
        }
    }
}

impl OAuthFlow {
    pub fn new(config: AuthConfig, http: reqwest::Client) -> Self {
        debug!("Initializing OAuth flow with client_id: {}", config.client_id);
        Self { config, http }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn client(&self) -> AuthResult<BasicClient> {
        let client = BasicClient::new(
            ClientId::new(self.config.client_id.clone()),
            None, // public client, PKCE instead of a secret
            AuthUrl::new(self.config.auth_endpoint.clone())
                .map_err(|e| AuthError::ConfigError(format!("Invalid auth endpoint: {}", e)))?,
            Some(
                TokenUrl::new(self.config.token_endpoint.clone()).map_err(|e| {
                    AuthError::ConfigError(format!("Invalid token endpoint: {}", e))
                })?,
            ),
        )
        .set_redirect_uri(
            RedirectUrl::new(self.config.redirect_uri.clone())
                .map_err(|e| AuthError::ConfigError(format!("Invalid redirect URI: {}", e)))?,
        );
        Ok(client)
    }

    fn token_set(&self, response: BasicTokenResponse, previous_refresh: Option<&str>) -> TokenSet {
        let refresh_token = response
            .refresh_token()
            .map(|rt| rt.secret().to_string())
            .or_else(|| previous_refresh.map(str::to_string));
        let scopes = response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
            .unwrap_or_else(|| self.config.scopes.clone());

        TokenSet::new(
            response.access_token().secret().to_string(),
            refresh_token,
            response.expires_in().map(|d| d.as_secs()),
            scopes,
        )
    }

    /// Build the authorization URL with a fresh PKCE pair and state
    pub fn build_auth_url(&self) -> AuthResult<(String, PendingAuthorization)> {
        debug!("Building authorization URL");

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let client = self.client()?;
        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);

        for scope in &self.config.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let (url, state) = request.url();
        Ok((
            url.to_string(),
            PendingAuthorization {
                code_verifier: pkce_verifier.secret().to_string(),
                state: state.secret().to_string(),
            },
        ))
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<TokenSet> {
        debug!("Exchanging authorization code for tokens");

        let response = self
            .client()?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(code_verifier.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| token_error("Token exchange failed", e))?;

        info!("Token exchange completed successfully");
        Ok(self.token_set(response, None))
    }

    /// Renew with a refresh token. The old refresh token is kept if the
    /// provider does not rotate it.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenSet> {
        debug!("Refreshing access token");

        let response = self
            .client()?
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| token_error("Token refresh failed", e))?;

        info!("Token refresh completed successfully");
        Ok(self.token_set(response, Some(refresh_token)))
    }

    /// Revoke a token at the provider (RFC 7009)
    pub async fn revoke(&self, token: &str, hint: &str) -> AuthResult<()> {
        debug!("Revoking {} at identity provider", hint);

        let response = self
            .http
            .post(&self.config.revoke_endpoint)
            .form(&[
                ("token", token),
                ("token_type_hint", hint),
                ("client_id", self.config.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::NetworkError(format!("Revocation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::NetworkError(format!(
                "Revocation failed with status {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }

    /// Provider sign-out URL that returns to the configured page
    pub fn end_session_url(&self) -> AuthResult<String> {
        let mut url = Url::parse(&self.config.end_session_endpoint)
            .map_err(|e| AuthError::ConfigError(format!("Invalid end-session endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair(
                "post_logout_redirect_uri",
                &self.config.post_logout_redirect_uri,
            );
        Ok(url.to_string())
    }
}
