//! Table formatting for CLI output

use apis_sdk::{ImpersonationStatus, WhoAmI};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn render(rows: Vec<FieldRow>) -> String {
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

fn or_dash(value: Option<&str>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or("-").to_string()
}

/// Render the signed-in identity
pub fn identity_table(who: &WhoAmI) -> String {
    let identity = &who.identity;
    render(vec![
        FieldRow {
            field: "Name",
            value: or_dash(Some(&identity.name)),
        },
        FieldRow {
            field: "Email",
            value: or_dash(Some(&identity.email)),
        },
        FieldRow {
            field: "Role",
            value: or_dash(Some(&identity.role)),
        },
        FieldRow {
            field: "Tenant",
            value: or_dash(Some(&identity.tenant_id)),
        },
        FieldRow {
            field: "Permissions",
            value: if who.permissions.is_empty() {
                "-".to_string()
            } else {
                who.permissions.join(", ")
            },
        },
    ])
}

/// Render an impersonation status
pub fn impersonation_table(status: &ImpersonationStatus) -> String {
    render(vec![
        FieldRow {
            field: "Impersonating",
            value: if status.impersonating { "yes" } else { "no" }.to_string(),
        },
        FieldRow {
            field: "Tenant",
            value: or_dash(status.tenant_id.as_deref()),
        },
        FieldRow {
            field: "Tenant name",
            value: or_dash(status.tenant_name.as_deref()),
        },
        FieldRow {
            field: "Original tenant",
            value: or_dash(status.original_tenant_id.as_deref()),
        },
        FieldRow {
            field: "Started",
            value: or_dash(status.started_at.as_deref()),
        },
        FieldRow {
            field: "Duration",
            value: or_dash(status.session_duration.as_deref()),
        },
    ])
}
