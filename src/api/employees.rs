//! Employees API endpoints, nested under companies.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, new_id, now_rfc3339, resource_types, Company, CreateEmployeeRequest, Employee,
    ImportEmployeesRequest, ImportEmployeesResponse, UpdateEmployeeRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_optional_text, validate_person_name, validate_uuid};

fn validate_create_request(req: &CreateEmployeeRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    collect_create_errors(req, &mut errors, None);
    errors.finish()
}

/// Collect validation errors for one employee row; `row` prefixes fields for
/// bulk import error reporting.
fn collect_create_errors(
    req: &CreateEmployeeRequest,
    errors: &mut ValidationErrorBuilder,
    row: Option<usize>,
) {
    let field = |name: &str| match row {
        Some(i) => format!("employees[{}].{}", i, name),
        None => name.to_string(),
    };

    if let Err(e) = validate_person_name(&req.first_name, "First name") {
        errors.add(field("first_name"), e);
    }
    if let Err(e) = validate_person_name(&req.last_name, "Last name") {
        errors.add(field("last_name"), e);
    }
    if let Err(e) = validate_email(&req.email) {
        errors.add(field("email"), e);
    }
    if let Err(e) = validate_optional_text(&req.position, "Position", 100) {
        errors.add(field("position"), e);
    }
    if let Err(e) = validate_optional_text(&req.department, "Department", 100) {
        errors.add(field("department"), e);
    }
}

fn validate_update_request(req: &UpdateEmployeeRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref first_name) = req.first_name {
        if let Err(e) = validate_person_name(first_name, "First name") {
            errors.add("first_name", e);
        }
    }
    if let Some(ref last_name) = req.last_name {
        if let Err(e) = validate_person_name(last_name, "Last name") {
            errors.add("last_name", e);
        }
    }
    if let Some(ref email) = req.email {
        if let Err(e) = validate_email(email) {
            errors.add("email", e);
        }
    }
    if let Err(e) = validate_optional_text(&req.position, "Position", 100) {
        errors.add("position", e);
    }
    if let Err(e) = validate_optional_text(&req.department, "Department", 100) {
        errors.add("department", e);
    }

    errors.finish()
}

async fn find_company(
    state: &AppState,
    company_id: &str,
    user_id: &str,
) -> Result<Company, ApiError> {
    if let Err(e) = validate_uuid(company_id, "company_id") {
        return Err(ApiError::validation_field("company_id", e));
    }

    Company::find_owned(&state.db, company_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))
}

/// List a company's employees
pub async fn list_employees(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(company_id): Path<String>,
) -> Result<Json<Vec<Employee>>, ApiError> {
    let company = find_company(&state, &company_id, &user.id).await?;

    let employees = sqlx::query_as::<_, Employee>(
        "SELECT * FROM employees WHERE company_id = ? ORDER BY last_name, first_name",
    )
    .bind(&company.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(employees))
}

/// Get a single employee
pub async fn get_employee(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Employee>, ApiError> {
    if let Err(e) = validate_uuid(&id, "employee_id") {
        return Err(ApiError::validation_field("employee_id", e));
    }

    let employee = Employee::find_owned(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    Ok(Json(employee))
}

/// Create an employee under a company
pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(company_id): Path<String>,
    Json(req): Json<CreateEmployeeRequest>,
) -> Result<(StatusCode, Json<Employee>), ApiError> {
    let company = find_company(&state, &company_id, &user.id).await?;
    validate_create_request(&req)?;

    let id = new_id();
    let now = now_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO employees (id, company_id, first_name, last_name, email, position,
                               department, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&company.id)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.email)
    .bind(&req.position)
    .bind(&req.department)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let employee = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::EMPLOYEE_CREATE,
        resource_types::EMPLOYEE,
        Some(&employee.id),
        Some(&employee.full_name()),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(employee)))
}

/// Bulk-import employees. Validation happens for every row before any
/// insert; one bad row rejects the whole batch.
pub async fn import_employees(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(company_id): Path<String>,
    Json(req): Json<ImportEmployeesRequest>,
) -> Result<(StatusCode, Json<ImportEmployeesResponse>), ApiError> {
    let company = find_company(&state, &company_id, &user.id).await?;

    if req.employees.is_empty() {
        return Err(ApiError::validation_field(
            "employees",
            "At least one employee is required",
        ));
    }

    let mut errors = ValidationErrorBuilder::new();
    for (i, employee) in req.employees.iter().enumerate() {
        collect_create_errors(employee, &mut errors, Some(i));
    }
    errors.finish()?;

    let now = now_rfc3339();
    let mut tx = state.db.begin().await?;

    for employee in &req.employees {
        sqlx::query(
            r#"
            INSERT INTO employees (id, company_id, first_name, last_name, email, position,
                                   department, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_id())
        .bind(&company.id)
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(&employee.email)
        .bind(&employee.position)
        .bind(&employee.department)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::EMPLOYEE_IMPORT,
        resource_types::COMPANY,
        Some(&company.id),
        Some(&company.name),
        Some(&user.id),
        ip.as_deref(),
        Some(serde_json::json!({ "imported": req.employees.len() })),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(ImportEmployeesResponse {
            imported: req.employees.len(),
        }),
    ))
}

/// Update an employee
pub async fn update_employee(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateEmployeeRequest>,
) -> Result<Json<Employee>, ApiError> {
    if let Err(e) = validate_uuid(&id, "employee_id") {
        return Err(ApiError::validation_field("employee_id", e));
    }
    validate_update_request(&req)?;

    let _existing = Employee::find_owned(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    let now = now_rfc3339();

    sqlx::query(
        r#"
        UPDATE employees SET
            first_name = COALESCE(?, first_name),
            last_name = COALESCE(?, last_name),
            email = COALESCE(?, email),
            position = COALESCE(?, position),
            department = COALESCE(?, department),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.email)
    .bind(&req.position)
    .bind(&req.department)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let employee = sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::EMPLOYEE_UPDATE,
        resource_types::EMPLOYEE,
        Some(&employee.id),
        Some(&employee.full_name()),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(employee))
}

/// Delete an employee; their targets are removed with them
pub async fn delete_employee(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if let Err(e) = validate_uuid(&id, "employee_id") {
        return Err(ApiError::validation_field("employee_id", e));
    }

    let employee = Employee::find_owned(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::EMPLOYEE_DELETE,
        resource_types::EMPLOYEE,
        Some(&employee.id),
        Some(&employee.full_name()),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
