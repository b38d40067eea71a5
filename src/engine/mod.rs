//! Campaign dispatch engine.
//!
//! A campaign "start" or "resume" enqueues its id on an mpsc channel; the
//! dispatcher drains the channel and emails the campaign's pending targets
//! in batches. Campaign status is re-read between batches, so a pause, stop,
//! or delete cancels the remaining sends at batch granularity while
//! already-sent targets keep accepting tracking events.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::api::metrics::record_email_sent;
use crate::config::DispatchConfig;
use crate::db::{
    now_rfc3339, render_placeholders, Campaign, CampaignStatus, PlaceholderValues,
    TargetWithEmployee,
};
use crate::mailer::{Mailer, OutgoingEmail};
use crate::DbPool;

/// A queued dispatch request: the campaign id.
pub type DispatchJob = String;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("campaign {0} no longer exists")]
    CampaignNotFound(String),
    #[error("campaign {0} is {1}, not active")]
    NotActive(String, String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// What a dispatch run did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Emails handed to the transport and marked sent
    pub sent: usize,
    /// Sends that failed; their targets stay pending for a later resume
    pub failed: usize,
    /// True when the run stopped early because the campaign left `active`
    pub halted: bool,
}

pub struct Dispatcher {
    db: DbPool,
    mailer: Arc<dyn Mailer>,
    config: DispatchConfig,
    public_url: String,
    rx: mpsc::Receiver<DispatchJob>,
}

impl Dispatcher {
    pub fn new(
        db: DbPool,
        mailer: Arc<dyn Mailer>,
        config: DispatchConfig,
        public_url: String,
        rx: mpsc::Receiver<DispatchJob>,
    ) -> Self {
        Self {
            db,
            mailer,
            config,
            public_url,
            rx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Campaign dispatcher started");

        while let Some(campaign_id) = self.rx.recv().await {
            tracing::info!(campaign_id = %campaign_id, "Dispatching campaign");

            match run_dispatch(
                &self.db,
                self.mailer.clone(),
                &self.config,
                &self.public_url,
                &campaign_id,
            )
            .await
            {
                Ok(outcome) => {
                    tracing::info!(
                        campaign_id = %campaign_id,
                        sent = outcome.sent,
                        failed = outcome.failed,
                        halted = outcome.halted,
                        "Campaign dispatch finished"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        campaign_id = %campaign_id,
                        error = %e,
                        "Campaign dispatch aborted"
                    );
                }
            }
        }
    }
}

/// Send pending targets of one campaign in batches.
pub async fn run_dispatch(
    db: &DbPool,
    mailer: Arc<dyn Mailer>,
    config: &DispatchConfig,
    public_url: &str,
    campaign_id: &str,
) -> Result<DispatchOutcome, DispatchError> {
    let campaign = fetch_campaign(db, campaign_id)
        .await?
        .ok_or_else(|| DispatchError::CampaignNotFound(campaign_id.to_string()))?;

    if campaign.status_enum() != CampaignStatus::Active {
        return Err(DispatchError::NotActive(
            campaign_id.to_string(),
            campaign.status.clone(),
        ));
    }

    let company_name: (String,) = sqlx::query_as("SELECT name FROM companies WHERE id = ?")
        .bind(&campaign.company_id)
        .fetch_one(db)
        .await?;

    let mut outcome = DispatchOutcome::default();

    loop {
        // Re-check between batches; the admin may have paused, stopped, or
        // deleted the campaign since the previous batch went out.
        let Some(current) = fetch_campaign(db, campaign_id).await? else {
            outcome.halted = true;
            break;
        };
        if current.status_enum() != CampaignStatus::Active {
            tracing::info!(
                campaign_id = %campaign_id,
                status = %current.status,
                "Campaign left active state, halting dispatch"
            );
            outcome.halted = true;
            break;
        }

        let batch = sqlx::query_as::<_, TargetWithEmployee>(
            r#"
            SELECT t.*, e.first_name, e.last_name, e.email, e.department
            FROM targets t
            JOIN employees e ON e.id = t.employee_id
            WHERE t.campaign_id = ? AND t.email_sent_at IS NULL
            ORDER BY t.created_at
            LIMIT ?
            "#,
        )
        .bind(campaign_id)
        .bind(config.batch_size)
        .fetch_all(db)
        .await?;

        if batch.is_empty() {
            break;
        }

        let mut batch_sent = 0usize;
        for target in &batch {
            let email = render_campaign_email(&campaign, target, &company_name.0, public_url);

            match mailer.send(&email).await {
                Ok(()) => {
                    mark_sent(db, &target.id).await?;
                    record_email_sent(true);
                    outcome.sent += 1;
                    batch_sent += 1;
                }
                Err(e) => {
                    // The target stays pending; a resume retries it
                    tracing::warn!(
                        target_id = %target.id,
                        to = %target.email,
                        error = %e,
                        "Failed to send campaign email"
                    );
                    record_email_sent(false);
                    outcome.failed += 1;
                }
            }
        }

        // Failed targets stay in the pending set; without progress the next
        // batch would be the same rows again
        if batch_sent == 0 {
            break;
        }

        if config.batch_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(config.batch_delay_ms)).await;
        }
    }

    Ok(outcome)
}

async fn fetch_campaign(db: &DbPool, id: &str) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM campaigns WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Mark a target sent. Conditional, so a duplicate dispatch of the same
/// campaign cannot move an existing sent timestamp.
async fn mark_sent(db: &DbPool, target_id: &str) -> Result<(), sqlx::Error> {
    let now = now_rfc3339();
    sqlx::query(
        r#"
        UPDATE targets SET
            email_sent_at = COALESCE(email_sent_at, ?),
            status = CASE WHEN status = 'pending' THEN 'sent' ELSE status END,
            updated_at = ?
        WHERE id = ? AND email_sent_at IS NULL
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(target_id)
    .execute(db)
    .await?;

    Ok(())
}

/// Render one target's email: substitute placeholders, route the phishing
/// link through the click endpoint, and append the open pixel.
///
/// Beyond the standard placeholders, `{{link}}` in the body becomes the
/// tracking click URL; bodies without it get the link appended so every
/// message stays trackable.
pub fn render_campaign_email(
    campaign: &Campaign,
    target: &TargetWithEmployee,
    company_name: &str,
    public_url: &str,
) -> OutgoingEmail {
    let values = PlaceholderValues {
        name: format!("{} {}", target.first_name, target.last_name),
        company: company_name.to_string(),
        email: target.email.clone(),
    };

    let subject = render_placeholders(&campaign.template_subject, &values);
    let body = render_placeholders(&campaign.template_body, &values);

    let click_url = format!("{}/track/click/{}", public_url, target.unique_token);
    let pixel_url = format!("{}/track/open/{}", public_url, target.unique_token);

    let (html_body, text_body) = if body.contains("{{link}}") {
        (
            body.replace("{{link}}", &click_url),
            body.replace("{{link}}", &click_url),
        )
    } else {
        (
            format!("{}\n<p><a href=\"{}\">Review now</a></p>", body, click_url),
            format!("{}\n\n{}", body, click_url),
        )
    };

    let html_body = format!(
        "{}\n<img src=\"{}\" width=\"1\" height=\"1\" alt=\"\">",
        html_body, pixel_url
    );

    OutgoingEmail {
        to: target.email.clone(),
        from_name: campaign.sender_name.clone(),
        from_email: campaign.sender_email.clone(),
        subject,
        html_body,
        text_body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records sends; optionally fails every attempt.
    struct MockMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
        fail: bool,
    }

    impl MockMailer {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Mailer for MockMailer {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn send(&self, email: &OutgoingEmail) -> Result<()> {
            if self.fail {
                anyhow::bail!("transport down");
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn test_config() -> DispatchConfig {
        DispatchConfig {
            batch_size: 10,
            batch_delay_ms: 0,
        }
    }

    async fn seed_campaign(db: &DbPool, status: &str, employees: usize) -> String {
        let now = now_rfc3339();

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role) VALUES ('u1', 'owner@test.local', 'x', 'Owner', 'user')",
        )
        .execute(db)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO companies (id, user_id, name, created_at, updated_at) VALUES ('co1', 'u1', 'Acme Corp', ?, ?)",
        )
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
            VALUES (?, 'co1', 'Exercise', ?, 'Action required, {{name}}',
                    '<p>Hi {{name}}, verify your {{company}} account: {{link}}</p>',
                    'IT Support', 'it-support@acme.test', ?, ?)
            "#,
        )
        .bind(&campaign_id)
        .bind(status)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await
        .unwrap();

        for i in 0..employees {
            let employee_id = format!("e{}", i);
            sqlx::query(
                r#"
                INSERT INTO employees (id, company_id, first_name, last_name, email, created_at, updated_at)
                VALUES (?, 'co1', 'Emp', ?, ?, ?, ?)
                "#,
            )
            .bind(&employee_id)
            .bind(format!("Number{}", i))
            .bind(format!("emp{}@acme.test", i))
            .bind(&now)
            .bind(&now)
            .execute(db)
            .await
            .unwrap();

            sqlx::query(
                r#"
                INSERT INTO targets (id, campaign_id, employee_id, unique_token, status, created_at, updated_at)
                VALUES (?, ?, ?, ?, 'pending', ?, ?)
                "#,
            )
            .bind(format!("t{}", i))
            .bind(&campaign_id)
            .bind(&employee_id)
            .bind(crate::db::generate_tracking_token())
            .bind(&now)
            .bind(&now)
            .execute(db)
            .await
            .unwrap();
        }

        campaign_id
    }

    #[tokio::test]
    async fn test_dispatch_sends_all_pending_targets() {
        let db = crate::db::init_memory().await.unwrap();
        let campaign_id = seed_campaign(&db, "active", 3).await;
        let mailer = Arc::new(MockMailer::new());

        let outcome = run_dispatch(
            &db,
            mailer.clone(),
            &test_config(),
            "https://phish.example.com",
            &campaign_id,
        )
        .await
        .unwrap();

        assert_eq!(outcome.sent, 3);
        assert_eq!(outcome.failed, 0);
        assert!(!outcome.halted);
        assert_eq!(mailer.sent_count(), 3);

        let pending: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM targets WHERE email_sent_at IS NULL")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(pending.0, 0);

        let sent_status: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM targets WHERE status = 'sent'")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(sent_status.0, 3);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_non_active_campaign() {
        let db = crate::db::init_memory().await.unwrap();
        let campaign_id = seed_campaign(&db, "paused", 2).await;
        let mailer = Arc::new(MockMailer::new());

        let err = run_dispatch(
            &db,
            mailer.clone(),
            &test_config(),
            "https://phish.example.com",
            &campaign_id,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DispatchError::NotActive(_, _)));
        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_missing_campaign() {
        let db = crate::db::init_memory().await.unwrap();
        let mailer = Arc::new(MockMailer::new());

        let err = run_dispatch(
            &db,
            mailer,
            &test_config(),
            "https://phish.example.com",
            "gone",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DispatchError::CampaignNotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_sends_leave_targets_pending() {
        let db = crate::db::init_memory().await.unwrap();
        let campaign_id = seed_campaign(&db, "active", 2).await;
        let mailer = Arc::new(MockMailer::failing());

        let outcome = run_dispatch(
            &db,
            mailer,
            &test_config(),
            "https://phish.example.com",
            &campaign_id,
        )
        .await
        .unwrap();

        assert_eq!(outcome.sent, 0);
        assert_eq!(outcome.failed, 2);

        let pending: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM targets WHERE email_sent_at IS NULL")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(pending.0, 2);
    }

    #[tokio::test]
    async fn test_rendered_email_routes_through_tracking() {
        let db = crate::db::init_memory().await.unwrap();
        let campaign_id = seed_campaign(&db, "active", 1).await;
        let mailer = Arc::new(MockMailer::new());

        run_dispatch(
            &db,
            mailer.clone(),
            &test_config(),
            "https://phish.example.com",
            &campaign_id,
        )
        .await
        .unwrap();

        let sent = mailer.sent.lock().unwrap();
        let email = &sent[0];

        assert_eq!(email.to, "emp0@acme.test");
        assert_eq!(email.from_email, "it-support@acme.test");
        // Placeholders substituted
        assert_eq!(email.subject, "Action required, Emp Number0");
        assert!(email.html_body.contains("verify your Acme Corp account"));
        // The link goes through the click endpoint, the pixel through open
        assert!(email
            .html_body
            .contains("https://phish.example.com/track/click/"));
        assert!(email
            .html_body
            .contains("https://phish.example.com/track/open/"));
        assert!(!email.html_body.contains("{{link}}"));
    }

    #[test]
    fn test_render_appends_link_when_template_has_none() {
        let now = now_rfc3339();
        let campaign = Campaign {
            id: "c1".to_string(),
            company_id: "co1".to_string(),
            name: "Exercise".to_string(),
            description: None,
            status: "active".to_string(),
            template_subject: "Hello {{name}}".to_string(),
            template_body: "<p>No explicit link here.</p>".to_string(),
            sender_name: "IT".to_string(),
            sender_email: "it@acme.test".to_string(),
            landing_page_url: None,
            start_date: None,
            end_date: None,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        let target = TargetWithEmployee {
            id: "t1".to_string(),
            campaign_id: "c1".to_string(),
            employee_id: "e1".to_string(),
            unique_token: "tok123".to_string(),
            status: "pending".to_string(),
            email_sent_at: None,
            email_opened_at: None,
            link_clicked_at: None,
            form_submitted_at: None,
            reported_at: None,
            created_at: now.clone(),
            updated_at: now,
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: "jane@acme.test".to_string(),
            department: None,
        };

        let email = render_campaign_email(&campaign, &target, "Acme", "http://localhost:8080");
        assert!(email
            .html_body
            .contains("http://localhost:8080/track/click/tok123"));
        assert!(email
            .text_body
            .contains("http://localhost:8080/track/click/tok123"));
        assert_eq!(email.subject, "Hello Jane Doe");
    }
}
