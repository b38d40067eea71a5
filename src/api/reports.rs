//! Reporting endpoints: campaign, company, and department statistics.
//!
//! Handlers only fetch rows and delegate the aggregation to the pure
//! `stats` module, so the numbers are unit-testable without a store.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::{Campaign, Company, Target, User};
use crate::stats::{compare_periods, summarize, PeriodComparison, RateSummary, RiskLevel};
use crate::AppState;

use super::error::ApiError;
use super::validation::validate_uuid;

#[derive(Debug, Serialize)]
pub struct CampaignStatsResponse {
    pub campaign_id: String,
    pub campaign_name: String,
    pub status: String,
    pub summary: RateSummary,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Serialize)]
pub struct CompanyStatsResponse {
    pub company_id: String,
    pub company_name: String,
    pub campaign_count: i64,
    pub summary: RateSummary,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Serialize)]
pub struct DepartmentStats {
    pub department: String,
    pub summary: RateSummary,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    /// Period length in days; compared against the preceding period of the
    /// same length. Defaults to 30.
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub company_id: String,
    pub period_days: i64,
    #[serde(flatten)]
    pub comparison: PeriodComparison,
}

async fn find_campaign(state: &AppState, id: &str, user_id: &str) -> Result<Campaign, ApiError> {
    if let Err(e) = validate_uuid(id, "campaign_id") {
        return Err(ApiError::validation_field("campaign_id", e));
    }

    Campaign::find_owned(&state.db, id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign not found"))
}

async fn find_company(state: &AppState, id: &str, user_id: &str) -> Result<Company, ApiError> {
    if let Err(e) = validate_uuid(id, "company_id") {
        return Err(ApiError::validation_field("company_id", e));
    }

    Company::find_owned(&state.db, id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))
}

/// GET /api/campaigns/:id/stats
pub async fn campaign_stats(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<CampaignStatsResponse>, ApiError> {
    let campaign = find_campaign(&state, &id, &user.id).await?;

    let targets = sqlx::query_as::<_, Target>("SELECT * FROM targets WHERE campaign_id = ?")
        .bind(&campaign.id)
        .fetch_all(&state.db)
        .await?;

    let summary = summarize(&targets);
    let risk_level = summary.risk_level();

    Ok(Json(CampaignStatsResponse {
        campaign_id: campaign.id,
        campaign_name: campaign.name,
        status: campaign.status,
        summary,
        risk_level,
    }))
}

/// GET /api/companies/:id/stats - aggregate over all the company's targets
pub async fn company_stats(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<CompanyStatsResponse>, ApiError> {
    let company = find_company(&state, &id, &user.id).await?;

    let targets = sqlx::query_as::<_, Target>(
        r#"
        SELECT t.* FROM targets t
        JOIN campaigns c ON c.id = t.campaign_id
        WHERE c.company_id = ?
        "#,
    )
    .bind(&company.id)
    .fetch_all(&state.db)
    .await?;

    let campaign_count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE company_id = ?")
            .bind(&company.id)
            .fetch_one(&state.db)
            .await?;

    let summary = summarize(&targets);
    let risk_level = summary.risk_level();

    Ok(Json(CompanyStatsResponse {
        company_id: company.id,
        company_name: company.name,
        campaign_count: campaign_count.0,
        summary,
        risk_level,
    }))
}

/// GET /api/companies/:id/stats/departments - per-department breakdown
pub async fn department_stats(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Vec<DepartmentStats>>, ApiError> {
    let company = find_company(&state, &id, &user.id).await?;

    let targets = sqlx::query_as::<_, Target>(
        r#"
        SELECT t.* FROM targets t
        JOIN campaigns c ON c.id = t.campaign_id
        WHERE c.company_id = ?
        "#,
    )
    .bind(&company.id)
    .fetch_all(&state.db)
    .await?;

    // Resolve each target's department in one query
    let departments: Vec<(String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT t.id, e.department FROM targets t
        JOIN employees e ON e.id = t.employee_id
        JOIN campaigns c ON c.id = t.campaign_id
        WHERE c.company_id = ?
        "#,
    )
    .bind(&company.id)
    .fetch_all(&state.db)
    .await?;

    let department_by_target: std::collections::HashMap<String, Option<String>> =
        departments.into_iter().collect();

    let mut grouped: BTreeMap<String, Vec<Target>> = BTreeMap::new();
    for target in targets {
        let department = department_by_target
            .get(&target.id)
            .cloned()
            .flatten()
            .unwrap_or_else(|| "Unassigned".to_string());
        grouped.entry(department).or_default().push(target);
    }

    let results = grouped
        .into_iter()
        .map(|(department, targets)| {
            let summary = summarize(&targets);
            let risk_level = summary.risk_level();
            DepartmentStats {
                department,
                summary,
                risk_level,
            }
        })
        .collect();

    Ok(Json(results))
}

/// GET /api/companies/:id/stats/trend?days=N
///
/// Compares the last N days against the N days before them. Targets are
/// bucketed by when their email went out; never-sent targets don't belong
/// to either period. The improvement is the real delta between the two
/// aggregates.
pub async fn company_trend(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<TrendResponse>, ApiError> {
    let company = find_company(&state, &id, &user.id).await?;

    let days = query.days.unwrap_or(30).clamp(1, 365);
    let now = chrono::Utc::now();
    let period_start = (now - chrono::Duration::days(days)).to_rfc3339();
    let previous_start = (now - chrono::Duration::days(days * 2)).to_rfc3339();

    let current = fetch_period_targets(&state, &company.id, &period_start, None).await?;
    let previous =
        fetch_period_targets(&state, &company.id, &previous_start, Some(&period_start)).await?;

    Ok(Json(TrendResponse {
        company_id: company.id,
        period_days: days,
        comparison: compare_periods(&current, &previous),
    }))
}

async fn fetch_period_targets(
    state: &AppState,
    company_id: &str,
    from: &str,
    until: Option<&str>,
) -> Result<Vec<Target>, sqlx::Error> {
    match until {
        Some(until) => {
            sqlx::query_as::<_, Target>(
                r#"
                SELECT t.* FROM targets t
                JOIN campaigns c ON c.id = t.campaign_id
                WHERE c.company_id = ?
                  AND t.email_sent_at IS NOT NULL
                  AND t.email_sent_at >= ?
                  AND t.email_sent_at < ?
                "#,
            )
            .bind(company_id)
            .bind(from)
            .bind(until)
            .fetch_all(&state.db)
            .await
        }
        None => {
            sqlx::query_as::<_, Target>(
                r#"
                SELECT t.* FROM targets t
                JOIN campaigns c ON c.id = t.campaign_id
                WHERE c.company_id = ?
                  AND t.email_sent_at IS NOT NULL
                  AND t.email_sent_at >= ?
                "#,
            )
            .bind(company_id)
            .bind(from)
            .fetch_all(&state.db)
            .await
        }
    }
}
