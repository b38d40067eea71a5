//! Audit log models for tracking user actions.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// Audit log entry for tracking user actions
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

/// Response for listing audit logs with pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogListResponse {
    pub items: Vec<AuditLog>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Query parameters for filtering audit logs
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    /// Filter by action (e.g., "campaign.start")
    pub action: Option<String>,
    /// Filter by resource type (e.g., "campaign", "company")
    pub resource_type: Option<String>,
    /// Filter by resource ID
    pub resource_id: Option<String>,
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 50, max 100)
    pub per_page: Option<i64>,
}

/// Common audit action types
pub mod actions {
    // Company actions
    pub const COMPANY_CREATE: &str = "company.create";
    pub const COMPANY_UPDATE: &str = "company.update";
    pub const COMPANY_DELETE: &str = "company.delete";

    // Employee actions
    pub const EMPLOYEE_CREATE: &str = "employee.create";
    pub const EMPLOYEE_UPDATE: &str = "employee.update";
    pub const EMPLOYEE_DELETE: &str = "employee.delete";
    pub const EMPLOYEE_IMPORT: &str = "employee.import";

    // Template actions
    pub const TEMPLATE_CREATE: &str = "template.create";
    pub const TEMPLATE_UPDATE: &str = "template.update";
    pub const TEMPLATE_DELETE: &str = "template.delete";

    // Campaign actions
    pub const CAMPAIGN_CREATE: &str = "campaign.create";
    pub const CAMPAIGN_UPDATE: &str = "campaign.update";
    pub const CAMPAIGN_DELETE: &str = "campaign.delete";
    pub const CAMPAIGN_START: &str = "campaign.start";
    pub const CAMPAIGN_PAUSE: &str = "campaign.pause";
    pub const CAMPAIGN_RESUME: &str = "campaign.resume";
    pub const CAMPAIGN_STOP: &str = "campaign.stop";

    // Auth actions
    pub const AUTH_LOGIN: &str = "auth.login";
    pub const AUTH_LOGOUT: &str = "auth.logout";
    pub const AUTH_SETUP: &str = "auth.setup";

    // Settings actions
    pub const EMAIL_TEST: &str = "email.test";
}

/// Resource type names used in audit entries
pub mod resource_types {
    pub const COMPANY: &str = "company";
    pub const EMPLOYEE: &str = "employee";
    pub const TEMPLATE: &str = "template";
    pub const CAMPAIGN: &str = "campaign";
    pub const USER: &str = "user";
}

/// Insert an audit log entry.
#[allow(clippy::too_many_arguments)]
pub async fn log_audit(
    db: &SqlitePool,
    action: &str,
    resource_type: &str,
    resource_id: Option<&str>,
    resource_name: Option<&str>,
    user_id: Option<&str>,
    ip_address: Option<&str>,
    details: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    let id = super::new_id();
    let details = details.map(|d| d.to_string());

    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, action, resource_type, resource_id, resource_name,
                                user_id, ip_address, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(action)
    .bind(resource_type)
    .bind(resource_id)
    .bind(resource_name)
    .bind(user_id)
    .bind(ip_address)
    .bind(&details)
    .bind(super::now_rfc3339())
    .execute(db)
    .await?;

    Ok(())
}

/// List audit logs with filtering and pagination.
pub async fn list_audit_logs(
    db: &SqlitePool,
    query: &AuditLogQuery,
) -> Result<AuditLogListResponse, sqlx::Error> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(50).clamp(1, 100);

    let mut conditions = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(ref action) = query.action {
        conditions.push("action = ?");
        binds.push(action.clone());
    }
    if let Some(ref resource_type) = query.resource_type {
        conditions.push("resource_type = ?");
        binds.push(resource_type.clone());
    }
    if let Some(ref resource_id) = query.resource_id {
        conditions.push("resource_id = ?");
        binds.push(resource_id.clone());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM audit_logs{}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for bind in &binds {
        count_query = count_query.bind(bind);
    }
    let total = count_query.fetch_one(db).await?;

    let list_sql = format!(
        "SELECT * FROM audit_logs{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        where_clause
    );
    let mut list_query = sqlx::query_as::<_, AuditLog>(&list_sql);
    for bind in &binds {
        list_query = list_query.bind(bind);
    }
    let items = list_query
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(db)
        .await?;

    Ok(AuditLogListResponse {
        items,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    })
}
