//! Input validation for API requests.
//!
//! For collecting multiple validation errors and returning them as an
//! ApiError, use the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for a plausible email address; intentionally permissive, the
    /// SMTP server is the final arbiter
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)+$"
    ).unwrap();

    /// Regex for validating HTTP/HTTPS landing page URLs
    static ref HTTP_URL_REGEX: Regex = Regex::new(
        r"^https?://[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)*(:\d+)?(/[-a-zA-Z0-9_%&=+@~.?]*)*$"
    ).unwrap();
}

/// Validate an id path/body parameter as a UUID
pub fn validate_uuid(id: &str, field: &str) -> Result<(), String> {
    uuid::Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| format!("{} must be a valid UUID", field))
}

/// Validate an email address (required field)
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a display name (company, campaign, or template name)
pub fn validate_name(name: &str, what: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{} name is required", what));
    }

    if name.len() < 2 {
        return Err(format!("{} name is too short (min 2 characters)", what));
    }

    if name.len() > 100 {
        return Err(format!("{} name is too long (max 100 characters)", what));
    }

    Ok(())
}

/// Validate a person name part (first or last name)
pub fn validate_person_name(name: &str, field: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{} is required", field));
    }

    if name.len() > 100 {
        return Err(format!("{} is too long (max 100 characters)", field));
    }

    Ok(())
}

/// Validate an optional free-text field
pub fn validate_optional_text(value: &Option<String>, field: &str, max: usize) -> Result<(), String> {
    if let Some(v) = value {
        if v.len() > max {
            return Err(format!("{} is too long (max {} characters)", field, max));
        }
    }

    Ok(())
}

/// Validate an email subject line
pub fn validate_subject(subject: &str) -> Result<(), String> {
    if subject.is_empty() {
        return Err("Subject is required".to_string());
    }

    if subject.len() > 255 {
        return Err("Subject is too long (max 255 characters)".to_string());
    }

    Ok(())
}

/// Validate an email body
pub fn validate_body(body: &str) -> Result<(), String> {
    if body.is_empty() {
        return Err("Body is required".to_string());
    }

    if body.len() > 100_000 {
        return Err("Body is too long (max 100000 characters)".to_string());
    }

    Ok(())
}

/// Validate an optional landing page URL
pub fn validate_landing_page_url(url: &Option<String>) -> Result<(), String> {
    if let Some(u) = url {
        if u.is_empty() {
            return Ok(()); // Empty string treated as no URL
        }

        if u.len() > 2048 {
            return Err("Landing page URL is too long (max 2048 characters)".to_string());
        }

        if !HTTP_URL_REGEX.is_match(u) {
            return Err("Landing page URL must be a valid HTTP(S) URL".to_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        for email in [
            "user@example.com",
            "first.last@sub.domain.co",
            "odd+tag@corp.io",
        ] {
            assert!(validate_email(email).is_ok(), "{} should be valid", email);
        }
    }

    #[test]
    fn test_invalid_emails() {
        for email in ["", "plainaddress", "missing@tld", "@nouser.com", "a@b@c.com"] {
            assert!(validate_email(email).is_err(), "{} should be invalid", email);
        }
    }

    #[test]
    fn test_name_length_bounds() {
        assert!(validate_name("", "Company").is_err());
        assert!(validate_name("A", "Company").is_err());
        assert!(validate_name("Acme", "Company").is_ok());
        assert!(validate_name(&"x".repeat(101), "Company").is_err());
    }

    #[test]
    fn test_landing_page_urls() {
        assert!(validate_landing_page_url(&None).is_ok());
        assert!(validate_landing_page_url(&Some(String::new())).is_ok());
        assert!(validate_landing_page_url(&Some("https://landing.example.com/page".to_string())).is_ok());
        assert!(validate_landing_page_url(&Some("ftp://example.com".to_string())).is_err());
        assert!(validate_landing_page_url(&Some("not a url".to_string())).is_err());
    }

    #[test]
    fn test_uuid_validation() {
        assert!(validate_uuid("3f2a1f64-5717-4562-b3fc-2c963f66afa6", "id").is_ok());
        assert!(validate_uuid("not-a-uuid", "id").is_err());
        assert!(validate_uuid("", "id").is_err());
    }
}
