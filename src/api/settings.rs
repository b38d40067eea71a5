//! Settings endpoints: SMTP status and test email.

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{actions, resource_types, User};
use crate::mailer::OutgoingEmail;
use crate::AppState;

use super::audit::{audit_log, extract_client_ip};
use super::error::ApiError;
use super::validation::validate_email;

#[derive(Debug, Serialize)]
pub struct EmailSettingsResponse {
    pub configured: bool,
    pub smtp_host: Option<String>,
    pub from_name: String,
    pub from_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct TestEmailResponse {
    pub sent: bool,
}

/// GET /api/settings/email - SMTP configuration status (no credentials)
pub async fn email_settings(State(state): State<Arc<AppState>>, _user: User) -> Json<EmailSettingsResponse> {
    let email = &state.config.email;
    Json(EmailSettingsResponse {
        configured: email.is_configured(),
        smtp_host: email.smtp_host.clone(),
        from_name: email.from_name.clone(),
        from_address: email.from_address.clone(),
    })
}

/// POST /api/settings/email/test - send a real test message through the
/// configured transport
pub async fn test_email(
    State(state): State<Arc<AppState>>,
    user: User,
    headers: HeaderMap,
    Json(req): Json<TestEmailRequest>,
) -> Result<Json<TestEmailResponse>, ApiError> {
    if let Err(e) = validate_email(&req.to) {
        return Err(ApiError::validation_field("to", e));
    }

    if !state.mailer.is_enabled() {
        return Err(ApiError::bad_request("SMTP is not configured"));
    }

    let from_address = state
        .config
        .email
        .from_address
        .clone()
        .unwrap_or_else(|| "noreply@evophisher.local".to_string());

    let message = OutgoingEmail {
        to: req.to.clone(),
        from_name: state.config.email.from_name.clone(),
        from_email: from_address,
        subject: "EvoPhisher test email".to_string(),
        html_body: "<p>This is a test email from your EvoPhisher instance. \
                    SMTP delivery is working.</p>"
            .to_string(),
        text_body: "This is a test email from your EvoPhisher instance. \
                    SMTP delivery is working."
            .to_string(),
    };

    state.mailer.send(&message).await.map_err(|e| {
        tracing::error!(error = %e, to = %req.to, "Test email failed");
        ApiError::internal("Failed to send test email")
    })?;

    let ip = extract_client_ip(&headers);
    audit_log(
        &state,
        actions::EMAIL_TEST,
        resource_types::USER,
        Some(&user.id),
        Some(&req.to),
        Some(&user.id),
        ip.as_deref(),
        None,
    )
    .await;

    Ok(Json(TestEmailResponse { sent: true }))
}
