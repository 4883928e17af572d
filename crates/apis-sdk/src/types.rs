//! Wire and domain types shared by the client and both auth backends

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication backend selected by the server deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthMode {
    /// Cookie session with CSRF double-submit (`local` on the wire)
    #[serde(rename = "local")]
    Session,
    /// Bearer tokens from an external identity provider (`keycloak` on the wire)
    #[serde(rename = "keycloak")]
    Token,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Session => write!(f, "session"),
            AuthMode::Token => write!(f, "token"),
        }
    }
}

/// Response of `GET /api/auth/config`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAuthConfig {
    pub mode: AuthMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keycloak_authority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Snapshot of the authenticated user. Re-fetched, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: String,
    pub tenant_id: String,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Who-am-i result: identity plus the permission list derived from the same source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhoAmI {
    pub identity: Identity,
    pub permissions: Vec<String>,
}

/// User object returned by the session endpoints
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub tenant_id: String,
}

/// `{ "user": {...} }` envelope of login and `/api/auth/me`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionUserEnvelope {
    pub user: SessionUser,
}

impl From<SessionUser> for WhoAmI {
    fn from(user: SessionUser) -> Self {
        let permissions = if user.role.is_empty() {
            Vec::new()
        } else {
            vec![user.role.clone()]
        };
        WhoAmI {
            identity: Identity {
                id: user.id,
                name: user.name,
                email: user.email,
                avatar: None,
                role: user.role,
                tenant_id: user.tenant_id,
            },
            permissions,
        }
    }
}

/// Login request body
#[derive(Debug, Serialize)]
pub(crate) struct LoginBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub remember_me: bool,
}

/// Change-password request body
#[derive(Debug, Serialize)]
pub(crate) struct ChangePasswordBody<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

/// Impersonation start request body
#[derive(Debug, Serialize)]
pub(crate) struct ImpersonateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
}

/// Server-side impersonation state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationStatus {
    pub impersonating: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<String>,
}

/// `{ "data": ... }` envelope used by the admin endpoints
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_wire_format() {
        let local: ServerAuthConfig =
            serde_json::from_str(r#"{"mode":"local","setup_required":false}"#).unwrap();
        assert_eq!(local.mode, AuthMode::Session);
        assert_eq!(local.setup_required, Some(false));

        let saas: ServerAuthConfig = serde_json::from_str(
            r#"{"mode":"keycloak","keycloak_authority":"https://kc.example.com/realms/honeybee","client_id":"apis-dashboard"}"#,
        )
        .unwrap();
        assert_eq!(saas.mode, AuthMode::Token);
        assert_eq!(saas.client_id.as_deref(), Some("apis-dashboard"));
    }

    #[test]
    fn test_session_user_maps_role_to_permissions() {
        let envelope: SessionUserEnvelope = serde_json::from_str(
            r#"{"user":{"id":"u1","email":"a@b.c","name":"Ana","role":"admin","tenant_id":"t1"}}"#,
        )
        .unwrap();
        let who: WhoAmI = envelope.user.into();
        assert_eq!(who.permissions, vec!["admin".to_string()]);
        assert!(who.identity.is_admin());
        assert_eq!(who.identity.tenant_id, "t1");
    }
}
