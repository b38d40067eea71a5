//! Email template models and placeholder rendering.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    Phishing,
    Training,
    Notification,
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Phishing => write!(f, "phishing"),
            Self::Training => write!(f, "training"),
            Self::Notification => write!(f, "notification"),
        }
    }
}

impl From<String> for TemplateType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "training" => Self::Training,
            "notification" => Self::Notification,
            _ => Self::Phishing,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailTemplate {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub template_type: String,
    pub is_public: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl EmailTemplate {
    pub fn template_type_enum(&self) -> TemplateType {
        TemplateType::from(self.template_type.clone())
    }

    /// Look up a template the user can read: their own or a public one.
    pub async fn find_visible(
        db: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<EmailTemplate>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM email_templates WHERE id = ? AND (user_id = ? OR is_public = 1)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    /// Look up a template the user can mutate: theirs only.
    pub async fn find_owned(
        db: &SqlitePool,
        id: &str,
        user_id: &str,
    ) -> Result<Option<EmailTemplate>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM email_templates WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(db)
            .await
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub subject: String,
    pub body: String,
    pub template_type: Option<TemplateType>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTemplateRequest {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub template_type: Option<TemplateType>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewTemplateRequest {
    /// Render against a real employee; falls back to sample values when unset.
    pub employee_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreviewTemplateResponse {
    pub subject: String,
    pub body: String,
}

/// Values substituted into template placeholders at render time.
#[derive(Debug, Clone)]
pub struct PlaceholderValues {
    pub name: String,
    pub company: String,
    pub email: String,
}

impl PlaceholderValues {
    pub fn sample() -> Self {
        Self {
            name: "Jane Doe".to_string(),
            company: "Acme Corp".to_string(),
            email: "jane.doe@example.com".to_string(),
        }
    }
}

/// Substitute the `{{name}}`, `{{company}}` and `{{email}}` placeholders.
/// Unknown placeholders are left verbatim.
pub fn render_placeholders(input: &str, values: &PlaceholderValues) -> String {
    input
        .replace("{{name}}", &values.name)
        .replace("{{company}}", &values.company)
        .replace("{{email}}", &values.email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> PlaceholderValues {
        PlaceholderValues {
            name: "Ola Nordmann".to_string(),
            company: "Nordmann AS".to_string(),
            email: "ola@nordmann.no".to_string(),
        }
    }

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let body = "Hi {{name}}, {{company}} IT asks you to verify {{email}}.";
        let rendered = render_placeholders(body, &values());
        assert_eq!(
            rendered,
            "Hi Ola Nordmann, Nordmann AS IT asks you to verify ola@nordmann.no."
        );
    }

    #[test]
    fn test_render_repeated_placeholder() {
        let rendered = render_placeholders("{{name}} / {{name}}", &values());
        assert_eq!(rendered, "Ola Nordmann / Ola Nordmann");
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let rendered = render_placeholders("Hello {{nickname}}", &values());
        assert_eq!(rendered, "Hello {{nickname}}");
    }

    #[test]
    fn test_plain_text_untouched() {
        let body = "No placeholders here.";
        assert_eq!(render_placeholders(body, &values()), body);
    }
}
