//! Target models: the per-(campaign, employee) tracking record.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    Sent,
    Opened,
    Clicked,
    Submitted,
    Reported,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Submitted => "submitted",
            Self::Reported => "reported",
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for TargetStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "sent" => Self::Sent,
            "opened" => Self::Opened,
            "clicked" => Self::Clicked,
            "submitted" => Self::Submitted,
            "reported" => Self::Reported,
            _ => Self::Pending,
        }
    }
}

/// The four inbound interactions a tracking URL can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingEvent {
    Open,
    Click,
    Submit,
    Report,
}

impl TrackingEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Click => "click",
            Self::Submit => "submit",
            Self::Report => "report",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Target {
    pub id: String,
    pub campaign_id: String,
    pub employee_id: String,
    pub unique_token: String,
    pub status: String,
    pub email_sent_at: Option<String>,
    pub email_opened_at: Option<String>,
    pub link_clicked_at: Option<String>,
    pub form_submitted_at: Option<String>,
    pub reported_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Target {
    pub fn status_enum(&self) -> TargetStatus {
        TargetStatus::from(self.status.clone())
    }

    /// Status derived from the timestamp columns. A report outranks the
    /// open/click/submit chain; within the chain the deepest interaction
    /// wins.
    pub fn derived_status(&self) -> TargetStatus {
        if self.reported_at.is_some() {
            TargetStatus::Reported
        } else if self.form_submitted_at.is_some() {
            TargetStatus::Submitted
        } else if self.link_clicked_at.is_some() {
            TargetStatus::Clicked
        } else if self.email_opened_at.is_some() {
            TargetStatus::Opened
        } else if self.email_sent_at.is_some() {
            TargetStatus::Sent
        } else {
            TargetStatus::Pending
        }
    }
}

/// Target joined with its employee for campaign detail views.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TargetWithEmployee {
    pub id: String,
    pub campaign_id: String,
    pub employee_id: String,
    pub unique_token: String,
    pub status: String,
    pub email_sent_at: Option<String>,
    pub email_opened_at: Option<String>,
    pub link_clicked_at: Option<String>,
    pub form_submitted_at: Option<String>,
    pub reported_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: Option<String>,
}

/// Generate a tracking token: 32 random bytes, URL-safe base64 without
/// padding. 256 bits of entropy; the token is the only credential the
/// tracking endpoints accept, so it must be unguessable.
pub fn generate_tracking_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_target() -> Target {
        Target {
            id: "t1".to_string(),
            campaign_id: "c1".to_string(),
            employee_id: "e1".to_string(),
            unique_token: generate_tracking_token(),
            status: "pending".to_string(),
            email_sent_at: None,
            email_opened_at: None,
            link_clicked_at: None,
            form_submitted_at: None,
            reported_at: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            updated_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_derived_status_follows_deepest_interaction() {
        let mut target = blank_target();
        assert_eq!(target.derived_status(), TargetStatus::Pending);

        target.email_sent_at = Some("2025-01-02T08:00:00Z".to_string());
        assert_eq!(target.derived_status(), TargetStatus::Sent);

        target.email_opened_at = Some("2025-01-02T09:00:00Z".to_string());
        assert_eq!(target.derived_status(), TargetStatus::Opened);

        target.link_clicked_at = Some("2025-01-02T09:05:00Z".to_string());
        assert_eq!(target.derived_status(), TargetStatus::Clicked);

        target.form_submitted_at = Some("2025-01-02T09:06:00Z".to_string());
        assert_eq!(target.derived_status(), TargetStatus::Submitted);
    }

    #[test]
    fn test_report_outranks_click_chain() {
        let mut target = blank_target();
        target.email_sent_at = Some("2025-01-02T08:00:00Z".to_string());
        target.link_clicked_at = Some("2025-01-02T09:05:00Z".to_string());
        target.reported_at = Some("2025-01-02T09:10:00Z".to_string());
        assert_eq!(target.derived_status(), TargetStatus::Reported);
    }

    #[test]
    fn test_token_is_url_safe_and_long_enough() {
        let token = generate_tracking_token();
        // 32 bytes -> 43 base64 chars, comfortably above 128 bits of entropy
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_tokens_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_tracking_token()));
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            TargetStatus::Pending,
            TargetStatus::Sent,
            TargetStatus::Opened,
            TargetStatus::Clicked,
            TargetStatus::Submitted,
            TargetStatus::Reported,
        ] {
            assert_eq!(TargetStatus::from(status.to_string()), status);
        }
    }
}
