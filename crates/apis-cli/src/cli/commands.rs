use clap::Subcommand;

/// Main CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the server's authentication mode
    Mode,

    /// Sign in and show the current identity
    Whoami,

    /// Sign in and GET an API path, printing the JSON response
    Get {
        /// Path under the server root, e.g. /api/hives
        path: String,
    },

    /// Act within another tenant (admin only)
    Impersonate {
        /// Tenant to impersonate
        tenant_id: String,

        /// Reason recorded in the audit log
        #[arg(long)]
        reason: Option<String>,
    },

    /// Return to your own tenant
    StopImpersonation,

    /// Show whether you are impersonating a tenant
    ImpersonationStatus,

    /// Ask the server to regenerate insights now
    RefreshInsights,

    /// Change your password (session mode)
    ChangePassword,

    /// End the server or identity-provider session
    Logout,
}
