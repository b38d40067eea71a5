//! Employee models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub id: String,
    pub company_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub position: Option<String>,
    pub department: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Look up an employee by id through the owner's company chain.
    pub async fn find_owned(
        db: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Employee>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT e.* FROM employees e
            JOIN companies c ON c.id = e.company_id
            WHERE e.id = ? AND c.user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEmployeeRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub position: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmployeeRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
}

/// Bulk import request (the dashboard's CSV-style import)
#[derive(Debug, Deserialize)]
pub struct ImportEmployeesRequest {
    pub employees: Vec<CreateEmployeeRequest>,
}

#[derive(Debug, Serialize)]
pub struct ImportEmployeesResponse {
    pub imported: usize,
}
