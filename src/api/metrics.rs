//! Prometheus metrics endpoint and HTTP request tracking middleware.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::db::TrackingEvent;
use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const TRACKING_EVENTS_TOTAL: &str = "tracking_events_total";
pub const EMAILS_SENT_TOTAL: &str = "emails_sent_total";
pub const CAMPAIGNS_ACTIVE: &str = "campaigns_active";

/// Initialize the Prometheus metrics recorder and return a handle for
/// rendering metrics. Called once during application startup.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        TRACKING_EVENTS_TOTAL,
        "Inbound tracking events by kind and outcome"
    );
    describe_counter!(EMAILS_SENT_TOTAL, "Campaign emails sent by outcome");
    describe_gauge!(CAMPAIGNS_ACTIVE, "Number of campaigns currently active");

    handle
}

/// Record an inbound tracking event. `outcome` is one of
/// recorded/duplicate/ignored.
pub fn record_tracking_event(event: TrackingEvent, outcome: &'static str) {
    counter!(TRACKING_EVENTS_TOTAL, "kind" => event.as_str(), "outcome" => outcome).increment(1);
}

/// Record a dispatched campaign email.
pub fn record_email_sent(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(EMAILS_SENT_TOTAL, "outcome" => outcome).increment(1);
}

/// GET /metrics - Returns Prometheus-formatted metrics.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM campaigns WHERE status = 'active'")
            .fetch_one(&state.db)
            .await
    {
        gauge!(CAMPAIGNS_ACTIVE).set(count as f64);
    }
}

/// Middleware to track HTTP request metrics.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Use the matched path for templates like /api/campaigns/:id
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}
