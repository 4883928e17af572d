//! Access-token claim decoding
//!
//! The client reads claims for display and permission checks only; the
//! server verifies signatures.

use super::types::{AuthError, AuthResult};
use crate::types::{Identity, WhoAmI};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

/// Claims carried by identity-provider access tokens
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub realm_access: RealmAccess,
    #[serde(default)]
    pub exp: Option<u64>,
}

/// Realm-level roles, nested under `realm_access`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

fn decode_payload(token: &str) -> AuthResult<Vec<u8>> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::InvalidToken("not a JWT".to_string()));
    };

    URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('=').as_bytes())
        .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {}", e)))
}

/// Decode the claims of a JWT without verifying it
pub fn decode(token: &str) -> AuthResult<TokenClaims> {
    let payload = decode_payload(token)?;
    serde_json::from_slice(&payload)
        .map_err(|e| AuthError::InvalidToken(format!("payload is not valid claims JSON: {}", e)))
}

/// Extract the `exp` claim, if the token is a JWT carrying one
pub(crate) fn decode_exp(token: &str) -> Option<u64> {
    let payload = decode_payload(token).ok()?;
    let json: serde_json::Value = serde_json::from_slice(&payload).ok()?;
    json.get("exp")?.as_u64()
}

/// Highest-priority role: admin > user > viewer, else the first one listed
pub fn primary_role(roles: &[String]) -> String {
    const PRIORITY: [&str; 3] = ["admin", "user", "viewer"];

    PRIORITY
        .iter()
        .find(|wanted| roles.iter().any(|r| r == *wanted))
        .map(|r| r.to_string())
        .or_else(|| roles.first().cloned())
        .unwrap_or_default()
}

impl TokenClaims {
    pub fn permissions(&self) -> Vec<String> {
        self.realm_access.roles.clone()
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.sub.clone(),
            name: self
                .name
                .clone()
                .or_else(|| self.preferred_username.clone())
                .unwrap_or_default(),
            email: self.email.clone().unwrap_or_default(),
            avatar: self.picture.clone(),
            role: primary_role(&self.realm_access.roles),
            tenant_id: self
                .org_id
                .clone()
                .or_else(|| self.tenant_id.clone())
                .unwrap_or_default(),
        }
    }

    pub fn who_am_i(&self) -> WhoAmI {
        WhoAmI {
            identity: self.identity(),
            permissions: self.permissions(),
        }
    }
}
