//! Campaign models and the lifecycle state machine.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// `completed` is terminal: no transition leaves it, and targets of a
    /// completed campaign are frozen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Valid lifecycle transitions:
    /// draft -> active -> {paused <-> active} -> completed
    pub fn can_transition(&self, to: CampaignStatus) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::Active)
                | (Self::Active, Self::Paused)
                | (Self::Paused, Self::Active)
                | (Self::Active, Self::Completed)
                | (Self::Paused, Self::Completed)
        )
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for CampaignStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => Self::Active,
            "paused" => Self::Paused,
            "completed" => Self::Completed,
            _ => Self::Draft,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub template_subject: String,
    pub template_body: String,
    pub sender_name: String,
    pub sender_email: String,
    pub landing_page_url: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Campaign {
    pub fn status_enum(&self) -> CampaignStatus {
        CampaignStatus::from(self.status.clone())
    }

    /// Look up a campaign by id through the owner's company chain.
    pub async fn find_owned(
        db: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT ca.* FROM campaigns ca
            JOIN companies co ON co.id = ca.company_id
            WHERE ca.id = ? AND co.user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }
}

/// Campaign with target count for list view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignWithTargetCount {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub sender_name: String,
    pub sender_email: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub target_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub description: Option<String>,
    pub template_subject: String,
    pub template_body: String,
    pub sender_name: String,
    pub sender_email: String,
    pub landing_page_url: Option<String>,
    /// Employees to enroll; one target row per employee is created with the
    /// campaign.
    pub employee_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub template_subject: Option<String>,
    pub template_body: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub landing_page_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_can_only_start() {
        let draft = CampaignStatus::Draft;
        assert!(draft.can_transition(CampaignStatus::Active));
        assert!(!draft.can_transition(CampaignStatus::Paused));
        assert!(!draft.can_transition(CampaignStatus::Completed));
        assert!(!draft.can_transition(CampaignStatus::Draft));
    }

    #[test]
    fn test_active_pauses_and_completes() {
        let active = CampaignStatus::Active;
        assert!(active.can_transition(CampaignStatus::Paused));
        assert!(active.can_transition(CampaignStatus::Completed));
        assert!(!active.can_transition(CampaignStatus::Draft));
    }

    #[test]
    fn test_paused_resumes_and_completes() {
        let paused = CampaignStatus::Paused;
        assert!(paused.can_transition(CampaignStatus::Active));
        assert!(paused.can_transition(CampaignStatus::Completed));
        assert!(!paused.can_transition(CampaignStatus::Draft));
    }

    #[test]
    fn test_completed_is_terminal() {
        let completed = CampaignStatus::Completed;
        assert!(completed.is_terminal());
        for to in [
            CampaignStatus::Draft,
            CampaignStatus::Active,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
        ] {
            assert!(!completed.can_transition(to));
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            CampaignStatus::Draft,
            CampaignStatus::Active,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
        ] {
            assert_eq!(CampaignStatus::from(status.to_string()), status);
        }
    }
}
