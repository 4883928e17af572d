//! Administrative tenant impersonation
//!
//! Starting or stopping impersonation changes what the server puts behind
//! the session, so the client drops its cached identity and asks the front
//! end to reload instead of patching anything in place.

use crate::client::ApisClient;
use crate::error::{ApiError, Result};
use crate::notify::{Notification, Redirect};
use crate::types::{DataEnvelope, ImpersonateBody, ImpersonationStatus};
use tracing::info;

impl ApisClient {
    async fn require_admin(&self) -> Result<()> {
        match self.identity().await {
            Some(identity) if identity.is_admin() => Ok(()),
            _ => {
                let error = ApiError::Forbidden {
                    message: "Impersonation requires the admin role".to_string(),
                };
                self.notifier().notify(Notification::warning(
                    "Access denied",
                    error.to_string(),
                ));
                Err(error)
            }
        }
    }

    fn reload(&self) {
        self.identity_cache().invalidate();
        self.navigator().navigate(Redirect::Reload);
    }

    /// Act within another tenant. Admin only; triggers a reload on success.
    pub async fn impersonate(&self, tenant_id: &str, reason: Option<&str>) -> Result<ImpersonationStatus> {
        if tenant_id.is_empty() || tenant_id.contains(['/', '?', '#']) {
            return Err(ApiError::InvalidRequest(format!(
                "invalid tenant id: {:?}",
                tenant_id
            )));
        }
        self.require_admin().await?;

        let envelope: DataEnvelope<ImpersonationStatus> = self
            .post(
                &format!("/api/admin/impersonate/{}", tenant_id),
                &ImpersonateBody { reason },
            )
            .await?;

        info!("Impersonating tenant {}", tenant_id);
        self.reload();
        Ok(envelope.data)
    }

    /// Return to the administrator's own tenant; triggers a reload
    pub async fn stop_impersonation(&self) -> Result<ImpersonationStatus> {
        let envelope: DataEnvelope<ImpersonationStatus> = self
            .post("/api/admin/impersonate/stop", &serde_json::json!({}))
            .await?;

        info!("Impersonation ended");
        self.reload();
        Ok(envelope.data)
    }

    /// Current impersonation state
    pub async fn impersonation_status(&self) -> Result<ImpersonationStatus> {
        let envelope: DataEnvelope<ImpersonationStatus> =
            self.get("/api/admin/impersonate/status").await?;
        Ok(envelope.data)
    }
}
