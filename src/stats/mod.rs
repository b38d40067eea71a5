//! Pure statistics aggregation over target rows.
//!
//! Everything in this module is a plain input -> output computation with no
//! store access, so report endpoints and tests share the same code path.

use serde::Serialize;

use crate::db::Target;

/// Click-rate thresholds for risk classification. Fixed policy constants.
const HIGH_RISK_CLICK_RATE: u32 = 30;
const MEDIUM_RISK_CLICK_RATE: u32 = 15;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Classify risk from a click rate. Strictly greater than: a click rate of
/// exactly 30 is medium, exactly 15 is low.
pub fn classify_risk(click_rate: u32) -> RiskLevel {
    if click_rate > HIGH_RISK_CLICK_RATE {
        RiskLevel::High
    } else if click_rate > MEDIUM_RISK_CLICK_RATE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Aggregated counts and rates for a set of targets.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RateSummary {
    pub total: u64,
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub submitted: u64,
    pub reported: u64,
    /// Integer percentages rounded to nearest; 0 for an empty input set.
    pub open_rate: u32,
    pub click_rate: u32,
    pub submit_rate: u32,
    pub report_rate: u32,
}

impl RateSummary {
    pub fn risk_level(&self) -> RiskLevel {
        classify_risk(self.click_rate)
    }
}

fn rate(count: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as u32
}

/// Compute rate statistics for a collection of targets.
///
/// Each rate is derived independently from its own timestamp column; a
/// target with a click but no recorded open still counts toward the click
/// rate.
pub fn summarize(targets: &[Target]) -> RateSummary {
    let total = targets.len() as u64;
    let sent = targets.iter().filter(|t| t.email_sent_at.is_some()).count() as u64;
    let opened = targets
        .iter()
        .filter(|t| t.email_opened_at.is_some())
        .count() as u64;
    let clicked = targets
        .iter()
        .filter(|t| t.link_clicked_at.is_some())
        .count() as u64;
    let submitted = targets
        .iter()
        .filter(|t| t.form_submitted_at.is_some())
        .count() as u64;
    let reported = targets.iter().filter(|t| t.reported_at.is_some()).count() as u64;

    RateSummary {
        total,
        sent,
        opened,
        clicked,
        submitted,
        reported,
        open_rate: rate(opened, total),
        click_rate: rate(clicked, total),
        submit_rate: rate(submitted, total),
        report_rate: rate(reported, total),
    }
}

/// Two adjacent periods compared for a trend report.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodComparison {
    pub current: RateSummary,
    pub previous: RateSummary,
    /// Percentage-point drop in click rate versus the previous period;
    /// positive when employees clicked less.
    pub improvement: i32,
}

/// Compare the current period against the previous one. The improvement is
/// the real delta between the two aggregates, not an estimate.
pub fn compare_periods(current: &[Target], previous: &[Target]) -> PeriodComparison {
    let current = summarize(current);
    let previous = summarize(previous);
    let improvement = previous.click_rate as i32 - current.click_rate as i32;

    PeriodComparison {
        current,
        previous,
        improvement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(
        opened: bool,
        clicked: bool,
        submitted: bool,
        reported: bool,
        index: usize,
    ) -> Target {
        let ts = |set: bool| set.then(|| "2025-03-01T12:00:00Z".to_string());
        Target {
            id: format!("t{}", index),
            campaign_id: "c1".to_string(),
            employee_id: format!("e{}", index),
            unique_token: format!("token-{}", index),
            status: "sent".to_string(),
            email_sent_at: Some("2025-03-01T08:00:00Z".to_string()),
            email_opened_at: ts(opened),
            link_clicked_at: ts(clicked),
            form_submitted_at: ts(submitted),
            reported_at: ts(reported),
            created_at: "2025-03-01T00:00:00Z".to_string(),
            updated_at: "2025-03-01T12:00:00Z".to_string(),
        }
    }

    /// The worked example: 10 targets, 6 opened, 3 clicked, 1 reported.
    fn example_targets() -> Vec<Target> {
        let mut targets = Vec::new();
        for i in 0..10 {
            let opened = i < 6;
            let clicked = i < 3;
            let reported = i == 9;
            targets.push(target(opened, clicked, false, reported, i));
        }
        targets
    }

    #[test]
    fn test_example_scenario_rates() {
        let summary = summarize(&example_targets());
        assert_eq!(summary.total, 10);
        assert_eq!(summary.open_rate, 60);
        assert_eq!(summary.click_rate, 30);
        assert_eq!(summary.report_rate, 10);
        assert_eq!(summary.submit_rate, 0);
    }

    #[test]
    fn test_risk_boundary_is_strict() {
        // Exactly 30 is medium, not high; exactly 15 is low, not medium.
        assert_eq!(classify_risk(30), RiskLevel::Medium);
        assert_eq!(classify_risk(31), RiskLevel::High);
        assert_eq!(classify_risk(15), RiskLevel::Low);
        assert_eq!(classify_risk(16), RiskLevel::Medium);
        assert_eq!(classify_risk(0), RiskLevel::Low);
        assert_eq!(classify_risk(100), RiskLevel::High);
    }

    #[test]
    fn test_example_scenario_risk_is_medium() {
        let summary = summarize(&example_targets());
        assert_eq!(summary.click_rate, 30);
        assert_eq!(summary.risk_level(), RiskLevel::Medium);
    }

    #[test]
    fn test_empty_set_yields_zero_rates() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.open_rate, 0);
        assert_eq!(summary.click_rate, 0);
        assert_eq!(summary.submit_rate, 0);
        assert_eq!(summary.report_rate, 0);
    }

    #[test]
    fn test_rates_stay_in_percentage_range() {
        let all = (0..7)
            .map(|i| target(true, true, true, true, i))
            .collect::<Vec<_>>();
        let summary = summarize(&all);
        for value in [
            summary.open_rate,
            summary.click_rate,
            summary.submit_rate,
            summary.report_rate,
        ] {
            assert!(value <= 100);
        }
        assert_eq!(summary.open_rate, 100);
    }

    #[test]
    fn test_summarize_is_pure() {
        let targets = example_targets();
        let first = summarize(&targets);
        let second = summarize(&targets);
        assert_eq!(first, second);
    }

    #[test]
    fn test_click_counts_without_recorded_open() {
        // Click without open is counted toward the click rate independently.
        let targets = vec![target(false, true, false, false, 0)];
        let summary = summarize(&targets);
        assert_eq!(summary.click_rate, 100);
        assert_eq!(summary.open_rate, 0);
    }

    #[test]
    fn test_rounding_to_nearest() {
        // 1 of 3 clicked -> 33.33 rounds to 33; 2 of 3 -> 66.67 rounds to 67.
        let one_of_three = vec![
            target(false, true, false, false, 0),
            target(false, false, false, false, 1),
            target(false, false, false, false, 2),
        ];
        assert_eq!(summarize(&one_of_three).click_rate, 33);

        let two_of_three = vec![
            target(false, true, false, false, 0),
            target(false, true, false, false, 1),
            target(false, false, false, false, 2),
        ];
        assert_eq!(summarize(&two_of_three).click_rate, 67);
    }

    #[test]
    fn test_period_comparison_reports_real_delta() {
        // Previous period: 2/4 clicked (50). Current period: 1/4 clicked (25).
        let previous = vec![
            target(true, true, false, false, 0),
            target(true, true, false, false, 1),
            target(true, false, false, false, 2),
            target(false, false, false, false, 3),
        ];
        let current = vec![
            target(true, true, false, false, 4),
            target(true, false, false, false, 5),
            target(false, false, false, false, 6),
            target(false, false, false, false, 7),
        ];
        let comparison = compare_periods(&current, &previous);
        assert_eq!(comparison.previous.click_rate, 50);
        assert_eq!(comparison.current.click_rate, 25);
        assert_eq!(comparison.improvement, 25);
    }

    #[test]
    fn test_period_comparison_negative_when_clicks_rise() {
        let previous = vec![target(false, false, false, false, 0)];
        let current = vec![target(false, true, false, false, 1)];
        let comparison = compare_periods(&current, &previous);
        assert_eq!(comparison.improvement, -100);
    }
}
