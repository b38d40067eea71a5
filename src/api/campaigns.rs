//! Campaign API endpoints: CRUD, bulk target enrollment, and the lifecycle
//! operations (start/pause/resume/stop).
//!
//! Lifecycle transitions are optimistic compare-and-set updates
//! (`UPDATE ... WHERE id = ? AND status = ?`) so two concurrent
//! administrators cannot race, e.g., a pause against a stop.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::db::{
    actions, generate_tracking_token, new_id, now_rfc3339, resource_types, Campaign,
    CampaignStatus, CampaignWithTargetCount, Company, CreateCampaignRequest, TargetWithEmployee,
    UpdateCampaignRequest, User,
};
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_body, validate_email, validate_landing_page_url, validate_name,
    validate_optional_text, validate_person_name, validate_subject, validate_uuid,
};

fn validate_create_request(req: &CreateCampaignRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_name(&req.name, "Campaign") {
        errors.add("name", e);
    }
    if let Err(e) = validate_optional_text(&req.description, "Description", 500) {
        errors.add("description", e);
    }
    if let Err(e) = validate_subject(&req.template_subject) {
        errors.add("template_subject", e);
    }
    if let Err(e) = validate_body(&req.template_body) {
        errors.add("template_body", e);
    }
    if let Err(e) = validate_person_name(&req.sender_name, "Sender name") {
        errors.add("sender_name", e);
    }
    if let Err(e) = validate_email(&req.sender_email) {
        errors.add("sender_email", e);
    }
    if let Err(e) = validate_landing_page_url(&req.landing_page_url) {
        errors.add("landing_page_url", e);
    }
    if req.employee_ids.is_empty() {
        errors.add("employee_ids", "At least one employee must be selected");
    }
    for id in &req.employee_ids {
        if validate_uuid(id, "employee_id").is_err() {
            errors.add("employee_ids", format!("{} is not a valid employee id", id));
        }
    }

    errors.finish()
}

fn validate_update_request(req: &UpdateCampaignRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref name) = req.name {
        if let Err(e) = validate_name(name, "Campaign") {
            errors.add("name", e);
        }
    }
    if let Err(e) = validate_optional_text(&req.description, "Description", 500) {
        errors.add("description", e);
    }
    if let Some(ref subject) = req.template_subject {
        if let Err(e) = validate_subject(subject) {
            errors.add("template_subject", e);
        }
    }
    if let Some(ref body) = req.template_body {
        if let Err(e) = validate_body(body) {
            errors.add("template_body", e);
        }
    }
    if let Some(ref sender_name) = req.sender_name {
        if let Err(e) = validate_person_name(sender_name, "Sender name") {
            errors.add("sender_name", e);
        }
    }
    if let Some(ref sender_email) = req.sender_email {
        if let Err(e) = validate_email(sender_email) {
            errors.add("sender_email", e);
        }
    }
    if let Err(e) = validate_landing_page_url(&req.landing_page_url) {
        errors.add("landing_page_url", e);
    }

    errors.finish()
}

async fn find_campaign(state: &AppState, id: &str, user_id: &str) -> Result<Campaign, ApiError> {
    if let Err(e) = validate_uuid(id, "campaign_id") {
        return Err(ApiError::validation_field("campaign_id", e));
    }

    Campaign::find_owned(&state.db, id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign not found"))
}

/// List a company's campaigns with target counts
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(company_id): Path<String>,
) -> Result<Json<Vec<CampaignWithTargetCount>>, ApiError> {
    if let Err(e) = validate_uuid(&company_id, "company_id") {
        return Err(ApiError::validation_field("company_id", e));
    }

    let company = Company::find_owned(&state.db, &company_id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    let campaigns = sqlx::query_as::<_, Campaign>(
        "SELECT * FROM campaigns WHERE company_id = ? ORDER BY created_at DESC",
    )
    .bind(&company.id)
    .fetch_all(&state.db)
    .await?;

    let mut results = Vec::new();
    for campaign in campaigns {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM targets WHERE campaign_id = ?")
            .bind(&campaign.id)
            .fetch_one(&state.db)
            .await?;

        results.push(CampaignWithTargetCount {
            id: campaign.id,
            company_id: campaign.company_id,
            name: campaign.name,
            description: campaign.description,
            status: campaign.status,
            sender_name: campaign.sender_name,
            sender_email: campaign.sender_email,
            start_date: campaign.start_date,
            end_date: campaign.end_date,
            created_at: campaign.created_at,
            updated_at: campaign.updated_at,
            target_count: count.0,
        });
    }

    Ok(Json(results))
}

/// Get a single campaign
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = find_campaign(&state, &id, &user.id).await?;
    Ok(Json(campaign))
}

/// List a campaign's targets joined with their employees
pub async fn list_targets(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Vec<TargetWithEmployee>>, ApiError> {
    let campaign = find_campaign(&state, &id, &user.id).await?;

    let targets = sqlx::query_as::<_, TargetWithEmployee>(
        r#"
        SELECT t.*, e.first_name, e.last_name, e.email, e.department
        FROM targets t
        JOIN employees e ON e.id = t.employee_id
        WHERE t.campaign_id = ?
        ORDER BY e.last_name, e.first_name
        "#,
    )
    .bind(&campaign.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(targets))
}

/// Create a campaign and enroll the selected employees as targets.
/// The campaign row and all target rows are written in one transaction.
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(company_id): Path<String>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    if let Err(e) = validate_uuid(&company_id, "company_id") {
        return Err(ApiError::validation_field("company_id", e));
    }

    let company = Company::find_owned(&state.db, &company_id, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    validate_create_request(&req)?;

    // All selected employees must belong to this company
    for employee_id in &req.employee_ids {
        let belongs: Option<(String,)> =
            sqlx::query_as("SELECT id FROM employees WHERE id = ? AND company_id = ?")
                .bind(employee_id)
                .bind(&company.id)
                .fetch_optional(&state.db)
                .await?;
        if belongs.is_none() {
            return Err(ApiError::validation_field(
                "employee_ids",
                format!("Employee {} does not belong to this company", employee_id),
            ));
        }
    }

    let id = new_id();
    let now = now_rfc3339();

    let mut tx = state.db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO campaigns (id, company_id, name, description, status, template_subject,
                               template_body, sender_name, sender_email, landing_page_url,
                               created_at, updated_at)
        VALUES (?, ?, ?, ?, 'draft', ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&company.id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.template_subject)
    .bind(&req.template_body)
    .bind(&req.sender_name)
    .bind(&req.sender_email)
    .bind(&req.landing_page_url)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for employee_id in &req.employee_ids {
        sqlx::query(
            r#"
            INSERT INTO targets (id, campaign_id, employee_id, unique_token, status,
                                 created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(new_id())
        .bind(&id)
        .bind(employee_id)
        .bind(generate_tracking_token())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let campaign = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::CAMPAIGN_CREATE,
        resource_types::CAMPAIGN,
        Some(&campaign.id),
        Some(&campaign.name),
        Some(&user.id),
        ip.as_deref(),
        Some(serde_json::json!({ "targets": req.employee_ids.len() })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(campaign)))
}

/// Update a campaign. Template and sender fields are frozen once the
/// campaign leaves draft; what was sent must stay inspectable as sent.
/// Name and description stay editable until the campaign completes.
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateCampaignRequest>,
) -> Result<Json<Campaign>, ApiError> {
    validate_update_request(&req)?;

    let existing = find_campaign(&state, &id, &user.id).await?;

    if existing.status_enum().is_terminal() {
        return Err(ApiError::conflict("Campaign is in a terminal state"));
    }

    let touches_content = req.template_subject.is_some()
        || req.template_body.is_some()
        || req.sender_name.is_some()
        || req.sender_email.is_some()
        || req.landing_page_url.is_some();
    if touches_content && existing.status_enum() != CampaignStatus::Draft {
        return Err(ApiError::conflict(
            "Template and sender fields can only be edited while the campaign is a draft",
        ));
    }

    let now = now_rfc3339();

    sqlx::query(
        r#"
        UPDATE campaigns SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            template_subject = COALESCE(?, template_subject),
            template_body = COALESCE(?, template_body),
            sender_name = COALESCE(?, sender_name),
            sender_email = COALESCE(?, sender_email),
            landing_page_url = COALESCE(?, landing_page_url),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.name)
    .bind(&req.description)
    .bind(&req.template_subject)
    .bind(&req.template_body)
    .bind(&req.sender_name)
    .bind(&req.sender_email)
    .bind(&req.landing_page_url)
    .bind(&now)
    .bind(&id)
    .execute(&state.db)
    .await?;

    let campaign = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::CAMPAIGN_UPDATE,
        resource_types::CAMPAIGN,
        Some(&campaign.id),
        Some(&campaign.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(campaign))
}

/// Delete a campaign. Cascades to targets and cancels any remaining
/// dispatch; the dispatcher re-checks campaign state between batches.
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let campaign = find_campaign(&state, &id, &user.id).await?;

    sqlx::query("DELETE FROM campaigns WHERE id = ?")
        .bind(&campaign.id)
        .execute(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::CAMPAIGN_DELETE,
        resource_types::CAMPAIGN,
        Some(&campaign.id),
        Some(&campaign.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Reject transitions the state machine forbids before touching the store.
/// The compare-and-set UPDATE remains the authoritative guard against races.
fn ensure_transition(campaign: &Campaign, to: CampaignStatus) -> Result<(), ApiError> {
    let from = campaign.status_enum();
    if from.is_terminal() {
        return Err(ApiError::conflict("Campaign is in a terminal state"));
    }
    if !from.can_transition(to) {
        return Err(ApiError::conflict(format!(
            "Campaign is {}, cannot become {}",
            campaign.status, to
        )));
    }
    Ok(())
}

/// Map a failed compare-and-set to the right error by re-reading the row.
async fn transition_conflict(
    state: &AppState,
    id: &str,
    user_id: &str,
    wanted: &str,
) -> ApiError {
    match Campaign::find_owned(&state.db, id, user_id).await {
        Ok(Some(campaign)) if campaign.status_enum().is_terminal() => {
            ApiError::conflict("Campaign is in a terminal state")
        }
        Ok(Some(campaign)) => ApiError::conflict(format!(
            "Campaign is {}, cannot {}",
            campaign.status, wanted
        )),
        _ => ApiError::not_found("Campaign not found"),
    }
}

/// Start a draft campaign: flips it to active and queues dispatch.
pub async fn start_campaign(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = find_campaign(&state, &id, &user.id).await?;
    ensure_transition(&campaign, CampaignStatus::Active)?;

    let target_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM targets WHERE campaign_id = ?")
        .bind(&campaign.id)
        .fetch_one(&state.db)
        .await?;
    if target_count.0 == 0 {
        return Err(ApiError::validation_field(
            "targets",
            "Nothing to send: the campaign has no targets",
        ));
    }

    let now = now_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE campaigns SET
            status = 'active',
            start_date = COALESCE(start_date, ?),
            updated_at = ?
        WHERE id = ? AND status = 'draft'
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(&campaign.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(transition_conflict(&state, &id, &user.id, "start").await);
    }

    enqueue_dispatch(&state, &campaign.id).await;

    let campaign = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = ?")
        .bind(&campaign.id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::CAMPAIGN_START,
        resource_types::CAMPAIGN,
        Some(&campaign.id),
        Some(&campaign.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(campaign))
}

/// Pause an active campaign; un-sent targets stop dispatching, already-sent
/// targets keep accepting tracking events.
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = find_campaign(&state, &id, &user.id).await?;
    ensure_transition(&campaign, CampaignStatus::Paused)?;

    let now = now_rfc3339();
    let result = sqlx::query(
        "UPDATE campaigns SET status = 'paused', updated_at = ? WHERE id = ? AND status = 'active'",
    )
    .bind(&now)
    .bind(&campaign.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(transition_conflict(&state, &id, &user.id, "pause").await);
    }

    let campaign = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = ?")
        .bind(&campaign.id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::CAMPAIGN_PAUSE,
        resource_types::CAMPAIGN,
        Some(&campaign.id),
        Some(&campaign.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(campaign))
}

/// Resume a paused campaign and queue dispatch of remaining pending targets.
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = find_campaign(&state, &id, &user.id).await?;
    ensure_transition(&campaign, CampaignStatus::Active)?;

    let now = now_rfc3339();
    let result = sqlx::query(
        "UPDATE campaigns SET status = 'active', updated_at = ? WHERE id = ? AND status = 'paused'",
    )
    .bind(&now)
    .bind(&campaign.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(transition_conflict(&state, &id, &user.id, "resume").await);
    }

    enqueue_dispatch(&state, &campaign.id).await;

    let campaign = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = ?")
        .bind(&campaign.id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::CAMPAIGN_RESUME,
        resource_types::CAMPAIGN,
        Some(&campaign.id),
        Some(&campaign.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(campaign))
}

/// Stop a campaign: terminal. Sets the end date and freezes all targets;
/// no tracking event lands on a completed campaign.
pub async fn stop_campaign(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = find_campaign(&state, &id, &user.id).await?;
    ensure_transition(&campaign, CampaignStatus::Completed)?;

    let now = now_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE campaigns SET
            status = 'completed',
            end_date = ?,
            updated_at = ?
        WHERE id = ? AND status IN ('active', 'paused')
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(&campaign.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(transition_conflict(&state, &id, &user.id, "stop").await);
    }

    let campaign = sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = ?")
        .bind(&campaign.id)
        .fetch_one(&state.db)
        .await?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::CAMPAIGN_STOP,
        resource_types::CAMPAIGN,
        Some(&campaign.id),
        Some(&campaign.name),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(campaign))
}

/// Hand a campaign to the dispatcher. A full queue is logged, not surfaced;
/// the operator can resume to retry.
async fn enqueue_dispatch(state: &AppState, campaign_id: &str) {
    if let Err(e) = state.dispatch_tx.send(campaign_id.to_string()).await {
        tracing::error!(
            campaign_id = %campaign_id,
            error = %e,
            "Failed to queue campaign for dispatch"
        );
    }
}
