//! Health scoring over the detector's findings

use crate::detector::{ErrorDetector, IntegrityMode};
use crate::error::Result;
use crate::sqlite;
use crate::types::{
    CorruptionReport, HealthIssue, HealthReport, HealthStatus, IntegrityReport, IssueKind,
    LogicalError, LogicalErrorKind, Severity,
};
use dbscope_core::{AnalysisConfig, ScoringPolicy};
use std::path::Path;

/// Everything a health check computed, for callers that also report findings
#[derive(Debug, Clone)]
pub struct HealthAssessment {
    pub report: HealthReport,
    pub integrity: IntegrityReport,
    pub corruption: CorruptionReport,
    pub logical: Vec<LogicalError>,
}

/// Findings the score is computed from
#[derive(Debug, Clone, Copy)]
pub struct ScoreInputs<'a> {
    pub integrity: &'a IntegrityReport,
    pub corruption: &'a CorruptionReport,
    pub logical: &'a [LogicalError],
    /// `None` when the schema could not be read
    pub table_count: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct HealthChecker {
    config: AnalysisConfig,
    policy: ScoringPolicy,
    detector: ErrorDetector,
}

impl HealthChecker {
    pub fn new(config: AnalysisConfig, policy: ScoringPolicy) -> Self {
        Self {
            detector: ErrorDetector::new(config.clone()),
            config,
            policy,
        }
    }

    pub async fn check_health(&self, path: &Path) -> Result<HealthReport> {
        Ok(self.assess(path, IntegrityMode::Full).await?.report)
    }

    /// Run the detector and score its findings.
    ///
    /// Fails only when the file is missing or not SQLite; a damaged file
    /// still gets a score.
    pub async fn assess(&self, path: &Path, mode: IntegrityMode) -> Result<HealthAssessment> {
        let integrity = self.detector.check_integrity_with(path, mode).await?;
        let corruption = self.detector.assess_corruption(path, &integrity).await?;
        let logical = self.detector.find_logical_errors(path).await?;
        let table_count = self.table_count(path).await;

        let report = score(
            &self.policy,
            &ScoreInputs {
                integrity: &integrity,
                corruption: &corruption,
                logical: &logical,
                table_count,
            },
        );

        tracing::info!(
            path = %path.display(),
            overall_score = report.overall_score,
            status = %report.health_status,
            issues = report.total_issues,
            "Health assessed"
        );

        Ok(HealthAssessment {
            report,
            integrity,
            corruption,
            logical,
        })
    }

    async fn table_count(&self, path: &Path) -> Option<usize> {
        let mut conn = match sqlite::open_read_only(path, &self.config).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Performance check skipped");
                return None;
            }
        };
        let tables = sqlite::list_tables(&mut conn).await;
        sqlite::close_quietly(conn).await;

        match tables {
            Ok(tables) => Some(tables.len()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Performance check skipped");
                None
            }
        }
    }
}

/// Compute the health report from findings.
///
/// Each sub-score starts at 100, loses the policy's penalties and is clamped
/// to `[0, 100]`; the overall score is their mean rounded to two decimals.
pub fn score(policy: &ScoringPolicy, inputs: &ScoreInputs<'_>) -> HealthReport {
    let integrity_score = if inputs.integrity.check_failed {
        0.0
    } else {
        clamp_score(100.0 - policy.integrity_error_penalty * inputs.integrity.total_errors as f64)
    };

    let corruption_score = if inputs.corruption.corruption_detected {
        clamp_score(100.0 - policy.corruption_penalty)
    } else {
        100.0
    };

    let logical_penalty: f64 = inputs
        .logical
        .iter()
        .map(|error| severity_penalty(policy, error.severity))
        .sum();
    let logical_score = clamp_score(100.0 - logical_penalty);

    let performance_score = match inputs.table_count {
        Some(count) => {
            let count = count as u64;
            let mut score = 100.0;
            if count > policy.table_count_warning {
                score -= policy.table_count_penalty;
            }
            if count > policy.table_count_critical {
                score -= policy.table_count_penalty;
            }
            clamp_score(score)
        }
        None => clamp_score(policy.performance_fallback_score),
    };

    let overall_score =
        round2((integrity_score + corruption_score + logical_score + performance_score) / 4.0);

    let issues = collect_issues(inputs);
    let recommendations = recommendations(overall_score, inputs);

    HealthReport {
        overall_score,
        integrity_score,
        corruption_score,
        logical_score,
        performance_score,
        total_issues: issues.len(),
        issues,
        recommendations,
        health_status: HealthStatus::from_score(overall_score),
    }
}

fn severity_penalty(policy: &ScoringPolicy, severity: Severity) -> f64 {
    match severity {
        Severity::Low => policy.low_penalty,
        Severity::Medium => policy.medium_penalty,
        Severity::High | Severity::Critical => policy.high_penalty,
    }
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn collect_issues(inputs: &ScoreInputs<'_>) -> Vec<HealthIssue> {
    let integrity_severity = if inputs.integrity.check_failed {
        Severity::Critical
    } else {
        Severity::High
    };

    let integrity = inputs.integrity.errors.iter().map(|message| HealthIssue {
        kind: IssueKind::Integrity,
        severity: integrity_severity,
        message: message.clone(),
    });

    let corruption = inputs.corruption.issues.iter().map(|message| HealthIssue {
        kind: IssueKind::Corruption,
        severity: inputs.corruption.severity.unwrap_or(Severity::Critical),
        message: message.clone(),
    });

    let logical = inputs.logical.iter().map(|error| HealthIssue {
        kind: IssueKind::Logical,
        severity: error.severity,
        message: error.message.clone(),
    });

    integrity.chain(corruption).chain(logical).collect()
}

fn recommendations(overall_score: f64, inputs: &ScoreInputs<'_>) -> Vec<String> {
    let mut recommendations = vec![
        if overall_score < 50.0 {
            "Critical health issues detected: back up the file and act on the reported issues immediately"
        } else if overall_score < 75.0 {
            "Some health issues detected: review the reported issues and plan fixes"
        } else {
            "Database is in good health"
        }
        .to_string(),
    ];

    if inputs.corruption.corruption_detected {
        recommendations.push(
            "Restore from a recent backup or copy the readable data out with VACUUM INTO".to_string(),
        );
    }
    if inputs
        .logical
        .iter()
        .any(|e| matches!(e.kind, LogicalErrorKind::OrphanedForeignKey { .. }))
    {
        recommendations.push(
            "Delete or re-link orphaned rows and enable PRAGMA foreign_keys in every writer".to_string(),
        );
    }
    if inputs
        .logical
        .iter()
        .any(|e| matches!(e.kind, LogicalErrorKind::NullInNotNull { .. }))
    {
        recommendations.push("Backfill NULL values stored in NOT NULL columns".to_string());
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{library_fixture, library_with_orphans};

    fn clean_integrity() -> IntegrityReport {
        IntegrityReport {
            check: "integrity_check".to_string(),
            total_errors: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            check_failed: false,
        }
    }

    fn no_corruption() -> CorruptionReport {
        CorruptionReport {
            corruption_detected: false,
            issues: Vec::new(),
            severity: None,
            recommendation: String::new(),
        }
    }

    fn orphan(count: u64) -> LogicalError {
        LogicalError {
            kind: LogicalErrorKind::OrphanedForeignKey {
                table: "books".to_string(),
                columns: vec!["author_id".to_string()],
                parent_table: "authors".to_string(),
                parent_columns: vec!["id".to_string()],
                count,
            },
            severity: Severity::Medium,
            message: format!("{} orphaned row(s)", count),
        }
    }

    fn assert_mean(report: &HealthReport) {
        let mean = (report.integrity_score
            + report.corruption_score
            + report.logical_score
            + report.performance_score)
            / 4.0;
        assert!((report.overall_score - mean).abs() < 0.005);
        for score in [
            report.overall_score,
            report.integrity_score,
            report.corruption_score,
            report.logical_score,
            report.performance_score,
        ] {
            assert!((0.0..=100.0).contains(&score));
        }
    }

    #[test]
    fn test_status_ladder_boundaries() {
        let cases = [
            (100.0, HealthStatus::Excellent),
            (90.0, HealthStatus::Excellent),
            (89.99, HealthStatus::Good),
            (75.0, HealthStatus::Good),
            (74.99, HealthStatus::Fair),
            (50.0, HealthStatus::Fair),
            (49.99, HealthStatus::Poor),
            (25.0, HealthStatus::Poor),
            (24.99, HealthStatus::Critical),
            (0.0, HealthStatus::Critical),
        ];
        for (score, expected) in cases {
            assert_eq!(HealthStatus::from_score(score), expected, "score {}", score);
        }
    }

    #[test]
    fn test_perfect_score() {
        let integrity = clean_integrity();
        let corruption = no_corruption();
        let report = score(
            &ScoringPolicy::default(),
            &ScoreInputs {
                integrity: &integrity,
                corruption: &corruption,
                logical: &[],
                table_count: Some(2),
            },
        );

        assert_eq!(report.overall_score, 100.0);
        assert_eq!(report.health_status, HealthStatus::Excellent);
        assert_eq!(report.total_issues, 0);
        assert_eq!(report.recommendations, vec!["Database is in good health"]);
    }

    #[test]
    fn test_unreadable_file_scores_poor() {
        let integrity = IntegrityReport {
            total_errors: 1,
            errors: vec!["Integrity check could not run: database disk image is malformed".to_string()],
            check_failed: true,
            ..clean_integrity()
        };
        let corruption = CorruptionReport {
            corruption_detected: true,
            issues: vec!["File is truncated".to_string()],
            severity: Some(Severity::Critical),
            recommendation: String::new(),
        };
        let logical = vec![LogicalError {
            kind: LogicalErrorKind::ScanFailed {
                table: None,
                reason: "database disk image is malformed".to_string(),
            },
            severity: Severity::High,
            message: String::new(),
        }];

        let report = score(
            &ScoringPolicy::default(),
            &ScoreInputs {
                integrity: &integrity,
                corruption: &corruption,
                logical: &logical,
                table_count: None,
            },
        );

        assert_eq!(report.integrity_score, 0.0);
        assert_eq!(report.corruption_score, 0.0);
        assert_eq!(report.logical_score, 80.0);
        assert_eq!(report.performance_score, 50.0);
        assert_eq!(report.overall_score, 32.5);
        assert_eq!(report.health_status, HealthStatus::Poor);
        assert_eq!(report.total_issues, 3);
        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations[0].starts_with("Critical"));
        assert_mean(&report);
    }

    #[test]
    fn test_logical_score_is_monotonic() {
        let integrity = clean_integrity();
        let corruption = no_corruption();
        let policy = ScoringPolicy::default();

        let mut previous = f64::MAX;
        for findings in 0..15 {
            let logical: Vec<LogicalError> = (0..findings).map(|i| orphan(i + 1)).collect();
            let report = score(
                &policy,
                &ScoreInputs {
                    integrity: &integrity,
                    corruption: &corruption,
                    logical: &logical,
                    table_count: Some(2),
                },
            );
            assert!(report.logical_score <= previous);
            assert!(report.logical_score < previous || report.logical_score == 0.0);
            assert_mean(&report);
            previous = report.logical_score;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn test_integrity_errors_and_table_count_penalties() {
        let integrity = IntegrityReport {
            total_errors: 2,
            errors: vec!["a".to_string(), "b".to_string()],
            ..clean_integrity()
        };
        let corruption = no_corruption();
        let policy = ScoringPolicy::default();

        let inputs = |table_count| ScoreInputs {
            integrity: &integrity,
            corruption: &corruption,
            logical: &[],
            table_count: Some(table_count),
        };

        let report = score(&policy, &inputs(11));
        assert_eq!(report.integrity_score, 60.0);
        assert_eq!(report.performance_score, 90.0);
        assert_eq!(report.overall_score, 87.5);
        assert_eq!(report.health_status, HealthStatus::Good);

        assert_eq!(score(&policy, &inputs(10)).performance_score, 100.0);
        assert_eq!(score(&policy, &inputs(51)).performance_score, 80.0);
    }

    #[test]
    fn test_targeted_recommendations() {
        let integrity = clean_integrity();
        let corruption = no_corruption();
        let logical = vec![orphan(4)];
        let report = score(
            &ScoringPolicy::default(),
            &ScoreInputs {
                integrity: &integrity,
                corruption: &corruption,
                logical: &logical,
                table_count: Some(2),
            },
        );

        assert_eq!(report.logical_score, 90.0);
        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations[1].contains("orphaned rows"));
    }

    #[tokio::test]
    async fn test_check_health_on_fixtures() {
        let checker = HealthChecker::default();

        let clean = library_fixture().await;
        let report = checker.check_health(clean.path()).await.unwrap();
        assert_eq!(report.overall_score, 100.0);
        assert_eq!(report.health_status, HealthStatus::Excellent);

        let again = checker.check_health(clean.path()).await.unwrap();
        assert_eq!(report, again);

        let orphans = library_with_orphans(2).await;
        let assessment = checker.assess(orphans.path(), IntegrityMode::Quick).await.unwrap();
        assert_eq!(assessment.integrity.check, "quick_check");
        assert_eq!(assessment.report.logical_score, 90.0);
        assert_eq!(assessment.report.overall_score, 97.5);
        assert_eq!(assessment.logical.len(), 1);
    }
}
