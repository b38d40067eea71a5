//! Shared helpers for row construction.

/// Fresh UUIDv4 row id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time in the RFC 3339 format all timestamp columns use.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
