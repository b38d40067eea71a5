pub mod auth;
pub mod metrics;
pub mod rate_limit;

mod audit;
mod campaigns;
mod companies;
mod employees;
mod error;
mod reports;
mod settings;
mod templates;
mod track;
mod validation;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public, tighter rate limit)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/setup-status", get(auth::setup_status))
        .route("/setup", post(auth::setup))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Public tracking routes; the token in the path is the only credential
    let track_routes = Router::new()
        .route("/open/:token", get(track::track_open))
        .route("/click/:token", get(track::track_click))
        .route("/submit/:token", post(track::track_submit))
        .route("/report/:token", post(track::track_report))
        .route("/awareness", get(track::awareness_page))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_track,
        ));

    // Protected API routes
    let api_routes = Router::new()
        // Companies
        .route("/companies", get(companies::list_companies))
        .route("/companies", post(companies::create_company))
        .route("/companies/:id", get(companies::get_company))
        .route("/companies/:id", put(companies::update_company))
        .route("/companies/:id", delete(companies::delete_company))
        // Employees
        .route("/companies/:id/employees", get(employees::list_employees))
        .route("/companies/:id/employees", post(employees::create_employee))
        .route(
            "/companies/:id/employees/import",
            post(employees::import_employees),
        )
        .route("/employees/:id", get(employees::get_employee))
        .route("/employees/:id", put(employees::update_employee))
        .route("/employees/:id", delete(employees::delete_employee))
        // Email templates
        .route("/templates", get(templates::list_templates))
        .route("/templates", post(templates::create_template))
        .route("/templates/:id", get(templates::get_template))
        .route("/templates/:id", put(templates::update_template))
        .route("/templates/:id", delete(templates::delete_template))
        .route("/templates/:id/preview", post(templates::preview_template))
        // Campaigns
        .route("/companies/:id/campaigns", get(campaigns::list_campaigns))
        .route("/companies/:id/campaigns", post(campaigns::create_campaign))
        .route("/campaigns/:id", get(campaigns::get_campaign))
        .route("/campaigns/:id", put(campaigns::update_campaign))
        .route("/campaigns/:id", delete(campaigns::delete_campaign))
        .route("/campaigns/:id/targets", get(campaigns::list_targets))
        .route("/campaigns/:id/start", post(campaigns::start_campaign))
        .route("/campaigns/:id/pause", post(campaigns::pause_campaign))
        .route("/campaigns/:id/resume", post(campaigns::resume_campaign))
        .route("/campaigns/:id/stop", post(campaigns::stop_campaign))
        // Reports
        .route("/campaigns/:id/stats", get(reports::campaign_stats))
        .route("/companies/:id/stats", get(reports::company_stats))
        .route(
            "/companies/:id/stats/departments",
            get(reports::department_stats),
        )
        .route("/companies/:id/stats/trend", get(reports::company_trend))
        // Settings
        .route("/settings/email", get(settings::email_settings))
        .route("/settings/email/test", post(settings::test_email))
        // Audit trail
        .route("/audit-logs", get(audit::list_logs))
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .nest("/track", track_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
