//! Email template API endpoints: CRUD plus placeholder preview.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, new_id, now_rfc3339, render_placeholders, resource_types, CreateTemplateRequest,
    EmailTemplate, Employee, PlaceholderValues, PreviewTemplateRequest, PreviewTemplateResponse,
    TemplateType, UpdateTemplateRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_body, validate_name, validate_subject, validate_uuid};

fn validate_create_request(req: &CreateTemplateRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_name(&req.name, "Template") {
        errors.add("name", e);
    }
    if let Err(e) = validate_subject(&req.subject) {
        errors.add("subject", e);
    }
    if let Err(e) = validate_body(&req.body) {
        errors.add("body", e);
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateTemplateRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref name) = req.name {
        if let Err(e) = validate_name(name, "Template") {
            errors.add("name", e);
        }
    }
    if let Some(ref subject) = req.subject {
        if let Err(e) = validate_subject(subject) {
            errors.add("subject", e);
        }
    }
    if let Some(ref body) = req.body {
        if let Err(e) = validate_body(body) {
            errors.add("body", e);
        }
    }

    errors.finish()
}

/// List templates visible to the caller: their own plus public ones
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<EmailTemplate>>, ApiError> {
    let templates = sqlx::query_as::<_, EmailTemplate>(
        r#"
        SELECT * FROM email_templates
        WHERE user_id = ? OR is_public = 1
        ORDER BY created_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(templates))
}

/// Get a single template (own or public)
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<EmailTemplate>, ApiError> {
    if let Err(e) = validate_uuid(&id, "template_id") {
        return Err(ApiError::validation_field("template_id", e));
    }

    let template = EmailTemplate::find_visible(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))?;

    Ok(Json(template))
}

/// Create a template
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<EmailTemplate>), ApiError> {
    validate_create_request(&req)?;

    let id = new_id();
    let now = now_rfc3339();
    let template_type = req.template_type.unwrap_or(TemplateType::Phishing);

    sqlx::query(
        r#"
        INSERT INTO email_templates (id, user_id, name, subject, body, template_type,
                                     is_public, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&req.name)
    .bind(&req.subject)
    .bind(&req.body)
    .bind(template_type.to_string())
    .bind(req.is_public.unwrap_or(false) as i64)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let template = sqlx::query_as::<_, EmailTemplate>("SELECT * FROM email_templates WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::TEMPLATE_CREATE,
        resource_types::TEMPLATE,
        Some(&template.id),
        Some(&template.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok((StatusCode::CREATED, Json(template)))
}

/// Update a template (owner only; public templates are read-only to others)
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateTemplateRequest>,
) -> Result<Json<EmailTemplate>, ApiError> {
    if let Err(e) = validate_uuid(&id, "template_id") {
        return Err(ApiError::validation_field("template_id", e));
    }
    validate_update_request(&req)?;

    let _existing = EmailTemplate::find_owned(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))?;

    let now = now_rfc3339();

    sqlx::query(
        r#"
        UPDATE email_templates SET
            name = COALESCE(?, name),
            subject = COALESCE(?, subject),
            body = COALESCE(?, body),
            template_type = COALESCE(?, template_type),
            is_public = COALESCE(?, is_public),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.name)
    .bind(&req.subject)
    .bind(&req.body)
    .bind(req.template_type.map(|t| t.to_string()))
    .bind(req.is_public.map(|p| p as i64))
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let template = sqlx::query_as::<_, EmailTemplate>("SELECT * FROM email_templates WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::TEMPLATE_UPDATE,
        resource_types::TEMPLATE,
        Some(&template.id),
        Some(&template.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(template))
}

/// Delete a template
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if let Err(e) = validate_uuid(&id, "template_id") {
        return Err(ApiError::validation_field("template_id", e));
    }

    let template = EmailTemplate::find_owned(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))?;

    sqlx::query("DELETE FROM email_templates WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::TEMPLATE_DELETE,
        resource_types::TEMPLATE,
        Some(&template.id),
        Some(&template.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Render a template's placeholders against a real employee or sample values
pub async fn preview_template(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<PreviewTemplateRequest>,
) -> Result<Json<PreviewTemplateResponse>, ApiError> {
    if let Err(e) = validate_uuid(&id, "template_id") {
        return Err(ApiError::validation_field("template_id", e));
    }

    let template = EmailTemplate::find_visible(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Template not found"))?;

    let values = match req.employee_id {
        Some(ref employee_id) => {
            if let Err(e) = validate_uuid(employee_id, "employee_id") {
                return Err(ApiError::validation_field("employee_id", e));
            }

            let employee = Employee::find_owned(&state.db, employee_id, &user.id)
                .await?
                .ok_or_else(|| ApiError::not_found("Employee not found"))?;

            let company_name: (String,) =
                sqlx::query_as("SELECT name FROM companies WHERE id = ?")
                    .bind(&employee.company_id)
                    .fetch_one(&state.db)
                    .await?;

            PlaceholderValues {
                name: employee.full_name(),
                company: company_name.0,
                email: employee.email,
            }
        }
        None => PlaceholderValues::sample(),
    };

    Ok(Json(PreviewTemplateResponse {
        subject: render_placeholders(&template.subject, &values),
        body: render_placeholders(&template.body, &values),
    }))
}
