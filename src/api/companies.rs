//! Companies API endpoints.
//!
//! Every query is scoped to the authenticated user; a company owned by
//! another account answers 404, never 403.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, new_id, now_rfc3339, resource_types, Company, CompanyWithCounts,
    CreateCompanyRequest, UpdateCompanyRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_name, validate_optional_text, validate_uuid};

fn validate_create_request(req: &CreateCompanyRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_name(&req.name, "Company") {
        errors.add("name", e);
    }
    if let Some(ref email) = req.email {
        if !email.is_empty() {
            if let Err(e) = validate_email(email) {
                errors.add("email", e);
            }
        }
    }
    if let Err(e) = validate_optional_text(&req.org_number, "Org number", 50) {
        errors.add("org_number", e);
    }
    if let Err(e) = validate_optional_text(&req.address, "Address", 500) {
        errors.add("address", e);
    }
    if let Err(e) = validate_optional_text(&req.phone, "Phone", 50) {
        errors.add("phone", e);
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateCompanyRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref name) = req.name {
        if let Err(e) = validate_name(name, "Company") {
            errors.add("name", e);
        }
    }
    if let Some(ref email) = req.email {
        if !email.is_empty() {
            if let Err(e) = validate_email(email) {
                errors.add("email", e);
            }
        }
    }
    if let Err(e) = validate_optional_text(&req.org_number, "Org number", 50) {
        errors.add("org_number", e);
    }
    if let Err(e) = validate_optional_text(&req.address, "Address", 500) {
        errors.add("address", e);
    }
    if let Err(e) = validate_optional_text(&req.phone, "Phone", 50) {
        errors.add("phone", e);
    }

    errors.finish()
}

/// List the caller's companies with employee and campaign counts
pub async fn list_companies(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<CompanyWithCounts>>, ApiError> {
    let companies = sqlx::query_as::<_, Company>(
        "SELECT * FROM companies WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let mut results = Vec::new();
    for company in companies {
        let employee_count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM employees WHERE company_id = ?")
                .bind(&company.id)
                .fetch_one(&state.db)
                .await?;
        let campaign_count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE company_id = ?")
                .bind(&company.id)
                .fetch_one(&state.db)
                .await?;

        results.push(CompanyWithCounts {
            id: company.id,
            name: company.name,
            org_number: company.org_number,
            address: company.address,
            phone: company.phone,
            email: company.email,
            created_at: company.created_at,
            updated_at: company.updated_at,
            employee_count: employee_count.0,
            campaign_count: campaign_count.0,
        });
    }

    Ok(Json(results))
}

/// Get a single company
pub async fn get_company(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Company>, ApiError> {
    if let Err(e) = validate_uuid(&id, "company_id") {
        return Err(ApiError::validation_field("company_id", e));
    }

    let company = Company::find_owned(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    Ok(Json(company))
}

/// Create a new company
pub async fn create_company(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Json(req): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<Company>), ApiError> {
    validate_create_request(&req)?;

    let id = new_id();
    let now = now_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO companies (id, user_id, name, org_number, address, phone, email,
                               created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&req.name)
    .bind(&req.org_number)
    .bind(&req.address)
    .bind(&req.phone)
    .bind(&req.email)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::COMPANY_CREATE,
        resource_types::COMPANY,
        Some(&company.id),
        Some(&company.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(company)))
}

/// Update a company
pub async fn update_company(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateCompanyRequest>,
) -> Result<Json<Company>, ApiError> {
    if let Err(e) = validate_uuid(&id, "company_id") {
        return Err(ApiError::validation_field("company_id", e));
    }
    validate_update_request(&req)?;

    let _existing = Company::find_owned(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    let now = now_rfc3339();

    sqlx::query(
        r#"
        UPDATE companies SET
            name = COALESCE(?, name),
            org_number = COALESCE(?, org_number),
            address = COALESCE(?, address),
            phone = COALESCE(?, phone),
            email = COALESCE(?, email),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.name)
    .bind(&req.org_number)
    .bind(&req.address)
    .bind(&req.phone)
    .bind(&req.email)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::COMPANY_UPDATE,
        resource_types::COMPANY,
        Some(&company.id),
        Some(&company.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(company))
}

/// Delete a company. Employees, campaigns, and targets go with it.
pub async fn delete_company(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if let Err(e) = validate_uuid(&id, "company_id") {
        return Err(ApiError::validation_field("company_id", e));
    }

    let company = Company::find_owned(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    let result = sqlx::query("DELETE FROM companies WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Company not found"));
    }

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::COMPANY_DELETE,
        resource_types::COMPANY,
        Some(&company.id),
        Some(&company.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
