//! Public tracking endpoints: pixel open, link click, form submit, and
//! report. No authentication; the per-target token is the only credential.
//!
//! Every write is a single conditional set-if-null UPDATE gated on the
//! campaign not being completed, so repeated or racing events cannot
//! overwrite the first recorded timestamp. Unknown tokens and frozen
//! campaigns get the same normal-looking response as valid ones; the
//! anomaly is only logged and counted.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use crate::db::{now_rfc3339, Target, TrackingEvent};
use crate::AppState;

use super::metrics::record_tracking_event;

/// 1x1 transparent GIF served for every open-pixel request.
const TRACKING_PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

const AWARENESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Security Awareness</title></head>
<body style="font-family: sans-serif; max-width: 560px; margin: 60px auto;">
    <h1>This was a phishing simulation</h1>
    <p>The email you interacted with was part of a security awareness
    exercise run by your organization. No credentials were stored.</p>
    <p>When in doubt: check the sender address, hover over links before
    clicking, and report suspicious email to your IT team.</p>
</body>
</html>"#;

const REPORT_CONFIRMATION_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Report Received</title></head>
<body style="font-family: sans-serif; max-width: 560px; margin: 60px auto;">
    <h1>Thank you for reporting</h1>
    <p>Your report has been recorded. Reporting suspicious email is exactly
    the right response.</p>
</body>
</html>"#;

/// What happened to an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventOutcome {
    /// Timestamp written for the first time
    Recorded,
    /// Event already recorded earlier; nothing changed
    Duplicate,
    /// Unknown token, or the campaign is completed/deleted
    Ignored,
}

impl EventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
        }
    }
}

/// Apply a tracking event to the target identified by `token`.
///
/// The UPDATE is conditional on the event's own timestamp column still
/// being NULL and the campaign not being completed, which makes the
/// operation atomic per row and idempotent. A click implies an open and a
/// submit implies a click, because the deeper interaction cannot happen
/// without the shallower one.
pub(crate) async fn apply_event(
    db: &sqlx::SqlitePool,
    token: &str,
    event: TrackingEvent,
    now: &str,
) -> Result<EventOutcome, sqlx::Error> {
    let sql = match event {
        TrackingEvent::Open => {
            r#"
            UPDATE targets SET
                email_opened_at = COALESCE(email_opened_at, ?),
                updated_at = ?
            WHERE unique_token = ?
              AND email_opened_at IS NULL
              AND campaign_id IN (SELECT id FROM campaigns WHERE status != 'completed')
            "#
        }
        TrackingEvent::Click => {
            r#"
            UPDATE targets SET
                link_clicked_at = COALESCE(link_clicked_at, ?),
                email_opened_at = COALESCE(email_opened_at, ?),
                updated_at = ?
            WHERE unique_token = ?
              AND link_clicked_at IS NULL
              AND campaign_id IN (SELECT id FROM campaigns WHERE status != 'completed')
            "#
        }
        TrackingEvent::Submit => {
            r#"
            UPDATE targets SET
                form_submitted_at = COALESCE(form_submitted_at, ?),
                link_clicked_at = COALESCE(link_clicked_at, ?),
                email_opened_at = COALESCE(email_opened_at, ?),
                updated_at = ?
            WHERE unique_token = ?
              AND form_submitted_at IS NULL
              AND campaign_id IN (SELECT id FROM campaigns WHERE status != 'completed')
            "#
        }
        TrackingEvent::Report => {
            r#"
            UPDATE targets SET
                reported_at = COALESCE(reported_at, ?),
                updated_at = ?
            WHERE unique_token = ?
              AND reported_at IS NULL
              AND campaign_id IN (SELECT id FROM campaigns WHERE status != 'completed')
            "#
        }
    };

    let mut query = sqlx::query(sql);
    let timestamp_binds = match event {
        TrackingEvent::Open | TrackingEvent::Report => 2,
        TrackingEvent::Click => 3,
        TrackingEvent::Submit => 4,
    };
    for _ in 0..timestamp_binds {
        query = query.bind(now);
    }
    let result = query.bind(token).execute(db).await?;

    if result.rows_affected() > 0 {
        refresh_status(db, token).await?;
        return Ok(EventOutcome::Recorded);
    }

    // Nothing written: either the event is a duplicate on a live campaign,
    // or the token is unknown / the campaign is frozen.
    let live: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT t.id FROM targets t
        JOIN campaigns c ON c.id = t.campaign_id
        WHERE t.unique_token = ? AND c.status != 'completed'
        "#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;

    match live {
        Some(_) => Ok(EventOutcome::Duplicate),
        None => Ok(EventOutcome::Ignored),
    }
}

/// Recompute the derived status column from the timestamp columns.
async fn refresh_status(db: &sqlx::SqlitePool, token: &str) -> Result<(), sqlx::Error> {
    let target: Option<Target> = sqlx::query_as("SELECT * FROM targets WHERE unique_token = ?")
        .bind(token)
        .fetch_optional(db)
        .await?;

    if let Some(target) = target {
        sqlx::query("UPDATE targets SET status = ? WHERE id = ?")
            .bind(target.derived_status().as_str())
            .bind(&target.id)
            .execute(db)
            .await?;
    }

    Ok(())
}

fn log_outcome(event: TrackingEvent, token: &str, outcome: EventOutcome) {
    record_tracking_event(event, outcome.as_str());
    if outcome == EventOutcome::Ignored {
        tracing::warn!(
            kind = event.as_str(),
            token = %token,
            "Ignored tracking event for unknown or frozen token"
        );
    } else {
        tracing::debug!(
            kind = event.as_str(),
            outcome = outcome.as_str(),
            "Tracking event processed"
        );
    }
}

/// GET /track/open/:token - the email-open pixel.
/// Always serves the pixel, whatever happened to the event.
pub async fn track_open(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match apply_event(&state.db, &token, TrackingEvent::Open, &now_rfc3339()).await {
        Ok(outcome) => log_outcome(TrackingEvent::Open, &token, outcome),
        Err(e) => tracing::error!(error = %e, "Failed to record open event"),
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, max-age=0"),
        ],
        TRACKING_PIXEL_GIF,
    )
        .into_response()
}

/// GET /track/click/:token - the phishing-link redirect.
/// Redirects to the campaign's landing page, or the built-in awareness page
/// when none is configured or the token is unknown.
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match apply_event(&state.db, &token, TrackingEvent::Click, &now_rfc3339()).await {
        Ok(outcome) => log_outcome(TrackingEvent::Click, &token, outcome),
        Err(e) => tracing::error!(error = %e, "Failed to record click event"),
    }

    let landing: Option<(Option<String>,)> = sqlx::query_as(
        r#"
        SELECT c.landing_page_url FROM targets t
        JOIN campaigns c ON c.id = t.campaign_id
        WHERE t.unique_token = ?
        "#,
    )
    .bind(&token)
    .fetch_optional(&state.db)
    .await
    .unwrap_or(None);

    match landing.and_then(|(url,)| url).filter(|url| !url.is_empty()) {
        Some(url) => Redirect::temporary(&url).into_response(),
        None => Redirect::temporary("/track/awareness").into_response(),
    }
}

/// POST /track/submit/:token - the credential-form post.
/// Submitted fields are dropped on the floor; only the fact of submission
/// is recorded. Responds with the awareness page either way.
pub async fn track_submit(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Html<&'static str> {
    match apply_event(&state.db, &token, TrackingEvent::Submit, &now_rfc3339()).await {
        Ok(outcome) => log_outcome(TrackingEvent::Submit, &token, outcome),
        Err(e) => tracing::error!(error = %e, "Failed to record submit event"),
    }

    Html(AWARENESS_PAGE)
}

/// POST /track/report/:token - the employee reported the email.
pub async fn track_report(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Html<&'static str> {
    match apply_event(&state.db, &token, TrackingEvent::Report, &now_rfc3339()).await {
        Ok(outcome) => log_outcome(TrackingEvent::Report, &token, outcome),
        Err(e) => tracing::error!(error = %e, "Failed to record report event"),
    }

    Html(REPORT_CONFIRMATION_PAGE)
}

/// GET /track/awareness - fallback landing page for campaigns without one.
pub async fn awareness_page() -> Html<&'static str> {
    Html(AWARENESS_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{generate_tracking_token, DbPool, TargetStatus};

    /// Seed a user/company/employee/campaign/target chain and return the
    /// target's token and the campaign id.
    async fn seed_target(db: &DbPool, campaign_status: &str) -> (String, String) {
        let now = now_rfc3339();

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role) VALUES ('u1', ?, 'x', 'Test User', 'user')",
        )
        .bind(format!("{}@example.com", crate::db::new_id()))
        .execute(db)
        .await
        .unwrap();

        let company_id = crate::db::new_id();
        sqlx::query(
            "INSERT INTO companies (id, user_id, name, created_at, updated_at) VALUES (?, 'u1', 'Acme', ?, ?)",
        )
        .bind(&company_id)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await
        .unwrap();

        let employee_id = crate::db::new_id();
        sqlx::query(
            r#"
            INSERT INTO employees (id, company_id, first_name, last_name, email, created_at, updated_at)
            VALUES (?, ?, 'Jane', 'Doe', 'jane@acme.test', ?, ?)
            "#,
        )
        .bind(&employee_id)
        .bind(&company_id)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await
        .unwrap();

        let campaign_id = crate::db::new_id();
        sqlx::query(
            r#"
            INSERT INTO campaigns (id, company_id, name, status, template_subject, template_body,
                                   sender_name, sender_email, created_at, updated_at)
            VALUES (?, ?, 'Q1 Exercise', ?, 'Subject', 'Body', 'IT', 'it@acme.test', ?, ?)
            "#,
        )
        .bind(&campaign_id)
        .bind(&company_id)
        .bind(campaign_status)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await
        .unwrap();

        let token = generate_tracking_token();
        sqlx::query(
            r#"
            INSERT INTO targets (id, campaign_id, employee_id, unique_token, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(crate::db::new_id())
        .bind(&campaign_id)
        .bind(&employee_id)
        .bind(&token)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await
        .unwrap();

        (token, campaign_id)
    }

    async fn fetch_target(db: &DbPool, token: &str) -> Target {
        sqlx::query_as("SELECT * FROM targets WHERE unique_token = ?")
            .bind(token)
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_event_sets_timestamp_once() {
        let db = crate::db::init_memory().await.unwrap();
        let (token, _) = seed_target(&db, "active").await;

        let outcome = apply_event(&db, &token, TrackingEvent::Open, "2025-03-01T10:00:00+00:00")
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Recorded);

        // A second open must not move the timestamp
        let outcome = apply_event(&db, &token, TrackingEvent::Open, "2025-03-01T11:00:00+00:00")
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Duplicate);

        let target = fetch_target(&db, &token).await;
        assert_eq!(
            target.email_opened_at.as_deref(),
            Some("2025-03-01T10:00:00+00:00")
        );
        assert_eq!(target.status_enum(), TargetStatus::Opened);
    }

    #[tokio::test]
    async fn test_click_implies_open() {
        let db = crate::db::init_memory().await.unwrap();
        let (token, _) = seed_target(&db, "active").await;

        apply_event(&db, &token, TrackingEvent::Click, "2025-03-01T10:00:00+00:00")
            .await
            .unwrap();

        let target = fetch_target(&db, &token).await;
        assert!(target.link_clicked_at.is_some());
        assert!(target.email_opened_at.is_some());
        assert_eq!(target.status_enum(), TargetStatus::Clicked);
    }

    #[tokio::test]
    async fn test_click_keeps_earlier_open_timestamp() {
        let db = crate::db::init_memory().await.unwrap();
        let (token, _) = seed_target(&db, "active").await;

        apply_event(&db, &token, TrackingEvent::Open, "2025-03-01T09:00:00+00:00")
            .await
            .unwrap();
        apply_event(&db, &token, TrackingEvent::Click, "2025-03-01T10:00:00+00:00")
            .await
            .unwrap();

        let target = fetch_target(&db, &token).await;
        assert_eq!(
            target.email_opened_at.as_deref(),
            Some("2025-03-01T09:00:00+00:00")
        );
        assert_eq!(
            target.link_clicked_at.as_deref(),
            Some("2025-03-01T10:00:00+00:00")
        );
    }

    #[tokio::test]
    async fn test_submit_implies_click_and_open() {
        let db = crate::db::init_memory().await.unwrap();
        let (token, _) = seed_target(&db, "active").await;

        apply_event(&db, &token, TrackingEvent::Submit, "2025-03-01T10:00:00+00:00")
            .await
            .unwrap();

        let target = fetch_target(&db, &token).await;
        // The causal chain: submitted implies clicked implies opened
        assert!(target.form_submitted_at.is_some());
        assert!(target.link_clicked_at.is_some());
        assert!(target.email_opened_at.is_some());
        assert_eq!(target.status_enum(), TargetStatus::Submitted);
    }

    #[tokio::test]
    async fn test_report_is_independent_of_click_chain() {
        let db = crate::db::init_memory().await.unwrap();
        let (token, _) = seed_target(&db, "active").await;

        apply_event(&db, &token, TrackingEvent::Report, "2025-03-01T10:00:00+00:00")
            .await
            .unwrap();

        let target = fetch_target(&db, &token).await;
        assert!(target.reported_at.is_some());
        assert!(target.email_opened_at.is_none());
        assert!(target.link_clicked_at.is_none());
        assert_eq!(target.status_enum(), TargetStatus::Reported);
    }

    #[tokio::test]
    async fn test_completed_campaign_freezes_targets() {
        let db = crate::db::init_memory().await.unwrap();
        let (token, _) = seed_target(&db, "completed").await;

        for event in [
            TrackingEvent::Open,
            TrackingEvent::Click,
            TrackingEvent::Submit,
            TrackingEvent::Report,
        ] {
            let outcome = apply_event(&db, &token, event, "2025-03-01T10:00:00+00:00")
                .await
                .unwrap();
            assert_eq!(outcome, EventOutcome::Ignored);
        }

        let target = fetch_target(&db, &token).await;
        assert!(target.email_opened_at.is_none());
        assert!(target.link_clicked_at.is_none());
        assert!(target.form_submitted_at.is_none());
        assert!(target.reported_at.is_none());
        assert_eq!(target.status_enum(), TargetStatus::Pending);
    }

    #[tokio::test]
    async fn test_paused_campaign_still_accepts_events() {
        let db = crate::db::init_memory().await.unwrap();
        let (token, _) = seed_target(&db, "paused").await;

        let outcome = apply_event(&db, &token, TrackingEvent::Open, "2025-03-01T10:00:00+00:00")
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Recorded);
    }

    #[tokio::test]
    async fn test_unknown_token_is_ignored() {
        let db = crate::db::init_memory().await.unwrap();
        let (_token, _) = seed_target(&db, "active").await;

        let outcome = apply_event(
            &db,
            "no-such-token",
            TrackingEvent::Open,
            "2025-03-01T10:00:00+00:00",
        )
        .await
        .unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_company_delete_cascades_to_targets() {
        let db = crate::db::init_memory().await.unwrap();
        let (token, campaign_id) = seed_target(&db, "active").await;

        let company_id: (String,) =
            sqlx::query_as("SELECT company_id FROM campaigns WHERE id = ?")
                .bind(&campaign_id)
                .fetch_one(&db)
                .await
                .unwrap();

        sqlx::query("DELETE FROM companies WHERE id = ?")
            .bind(&company_id.0)
            .execute(&db)
            .await
            .unwrap();

        let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM targets")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(remaining.0, 0);

        let employees: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM employees")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(employees.0, 0);

        // Late event for the deleted target is silently ignored
        let outcome = apply_event(&db, &token, TrackingEvent::Open, "2025-03-01T10:00:00+00:00")
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::Ignored);
    }

    #[test]
    fn test_pixel_is_a_gif() {
        assert_eq!(&TRACKING_PIXEL_GIF[..6], b"GIF89a");
        assert_eq!(*TRACKING_PIXEL_GIF.last().unwrap(), 0x3B);
    }
}
