//! Integrity, corruption and logical consistency checks
//!
//! Once a file is recognised as SQLite, engine failures are findings, not
//! errors: a damaged file still produces reports the health score can use.
//! Only a missing, unreadable or unrecognised file fails a check.

use crate::error::{AnalysisError, Result};
use crate::header::{FileHeader, HEADER_LEN};
use crate::sqlite::{self, quote_identifier, quote_literal};
use crate::types::{
    CorruptionReport, IntegrityReport, LogicalError, LogicalErrorKind, Severity, SuggestedFix,
};
use dbscope_core::AnalysisConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

static INDEX_NAME: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?:in|from) index (\S+)").expect("Hard-coded regex pattern should be valid")
});

const MAIN_DATABASE_PREFIX: &str = "*** in database main ***";

/// Which engine check backs the integrity report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityMode {
    /// `PRAGMA integrity_check`: b-trees, indexes and constraints
    #[default]
    Full,
    /// `PRAGMA quick_check`: skips index content verification
    Quick,
}

impl IntegrityMode {
    pub fn pragma(&self) -> &'static str {
        match self {
            IntegrityMode::Full => "integrity_check",
            IntegrityMode::Quick => "quick_check",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorDetector {
    config: AnalysisConfig,
}

impl ErrorDetector {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub async fn check_integrity(&self, path: &Path) -> Result<IntegrityReport> {
        self.check_integrity_with(path, IntegrityMode::Full).await
    }

    /// Run the engine's structural check and collect its messages.
    ///
    /// When the check itself cannot run, the report has `check_failed` set
    /// and carries the engine error as its only message. A file locked by
    /// another connection fails with `Locked` instead.
    pub async fn check_integrity_with(&self, path: &Path, mode: IntegrityMode) -> Result<IntegrityReport> {
        sqlite::ensure_sqlite(path).await?;
        let max_errors = self.config.integrity_max_errors.max(1);

        let outcome = match sqlite::connect(path, &self.config).await {
            Ok(mut conn) => {
                let sql = format!("PRAGMA {}({})", mode.pragma(), max_errors);
                let lines = sqlx::query_scalar::<_, String>(&sql).fetch_all(&mut conn).await;
                sqlite::close_quietly(conn).await;
                lines.map_err(|e| AnalysisError::query(mode.pragma(), e))
            }
            Err(e) => Err(e),
        };

        let report = match outcome {
            Ok(lines) => integrity_report(mode, lines, max_errors),
            Err(e) if e.is_locked() => return Err(AnalysisError::locked(path)),
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(path = %path.display(), error = %reason, "Integrity check could not run");
                IntegrityReport {
                    check: mode.pragma().to_string(),
                    total_errors: 1,
                    errors: vec![format!("Integrity check could not run: {}", reason)],
                    warnings: Vec::new(),
                    check_failed: true,
                }
            }
        };

        tracing::debug!(
            path = %path.display(),
            check = %report.check,
            total_errors = report.total_errors,
            "Integrity checked"
        );
        Ok(report)
    }

    pub async fn detect_corruption(&self, path: &Path) -> Result<CorruptionReport> {
        let integrity = self.check_integrity(path).await?;
        self.assess_corruption(path, &integrity).await
    }

    /// Combine an integrity report with header and page-level checks.
    ///
    /// Corruption is reported when the integrity check found errors or could
    /// not run, the file header is inconsistent with the file, or the engine
    /// cannot read the page metadata.
    pub async fn assess_corruption(&self, path: &Path, integrity: &IntegrityReport) -> Result<CorruptionReport> {
        let inspected = sqlite::ensure_sqlite(path).await?;
        let mut issues = Vec::new();
        let mut severity = None;

        if !inspected.prefix.is_empty() {
            match FileHeader::parse(&inspected.prefix) {
                Some(header) => {
                    let wal_present = tokio::fs::try_exists(sqlite::wal_path(path))
                        .await
                        .unwrap_or(false);
                    let header_issues = header.structural_issues(inspected.len, wal_present);
                    if !header_issues.is_empty() {
                        severity = Some(Severity::Critical);
                    }
                    issues.extend(header_issues);
                }
                None => {
                    severity = Some(Severity::Critical);
                    issues.push(format!(
                        "File header is incomplete: {} of {} bytes present",
                        inspected.prefix.len().min(HEADER_LEN),
                        HEADER_LEN
                    ));
                }
            }
        }

        if let Some(reason) = self.page_read_failure(path).await? {
            severity = Some(Severity::Critical);
            issues.push(format!("Engine could not read database pages: {}", reason));
        }

        if integrity.check_failed {
            severity = Some(Severity::Critical);
            issues.push("Integrity check could not run".to_string());
        } else if integrity.total_errors > 0 {
            severity = severity.max(Some(Severity::High));
            issues.push(format!(
                "Integrity check reported {} error(s)",
                integrity.total_errors
            ));
        }

        let corruption_detected = !issues.is_empty();
        if corruption_detected {
            tracing::warn!(path = %path.display(), issues = issues.len(), "Corruption detected");
        }

        Ok(CorruptionReport {
            corruption_detected,
            issues,
            severity,
            recommendation: if corruption_detected {
                "Restore from a backup, or copy the readable data into a new file with VACUUM INTO and verify it".to_string()
            } else {
                "No corruption detected".to_string()
            },
        })
    }

    async fn page_read_failure(&self, path: &Path) -> Result<Option<String>> {
        let mut conn = match sqlite::connect(path, &self.config).await {
            Ok(conn) => conn,
            Err(e) if e.is_locked() => return Err(e),
            Err(e) => return Ok(Some(e.to_string())),
        };

        let mut failure = None;
        for pragma in ["page_count", "page_size"] {
            if let Err(e) = sqlite::pragma_i64(&mut conn, pragma).await {
                failure = Some(e);
                break;
            }
        }
        sqlite::close_quietly(conn).await;

        match failure {
            Some(e) if e.is_locked() => Err(AnalysisError::locked(path)),
            Some(e) => Ok(Some(e.to_string())),
            None => Ok(None),
        }
    }

    /// Consistency rules the engine's integrity check does not enforce
    pub async fn find_logical_errors(&self, path: &Path) -> Result<Vec<LogicalError>> {
        sqlite::ensure_sqlite(path).await?;

        let mut conn = match sqlite::connect(path, &self.config).await {
            Ok(conn) => conn,
            Err(e) if e.is_locked() => return Err(e),
            Err(e) => return Ok(vec![scan_failed(None, e.to_string())]),
        };
        let findings = logical_scan(&mut conn).await;
        sqlite::close_quietly(conn).await;
        let findings = findings.map_err(|e| e.locked_at(path))?;

        tracing::debug!(path = %path.display(), findings = findings.len(), "Logical scan finished");
        Ok(findings)
    }

    /// Run every check and derive corrective SQL. Nothing is executed.
    pub async fn suggest_fixes(&self, path: &Path) -> Result<Vec<SuggestedFix>> {
        let integrity = self.check_integrity(path).await?;
        let corruption = self.assess_corruption(path, &integrity).await?;
        let logical = self.find_logical_errors(path).await?;
        Ok(fixes_for(path, &integrity, &corruption, &logical))
    }
}

fn integrity_report(mode: IntegrityMode, lines: Vec<String>, max_errors: u32) -> IntegrityReport {
    let errors: Vec<String> = lines
        .iter()
        .map(|line| line.trim_start_matches(MAIN_DATABASE_PREFIX).trim().to_string())
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("ok"))
        .collect();

    let mut warnings = Vec::new();
    if errors.len() >= max_errors as usize {
        warnings.push(format!(
            "{} stopped after {} errors; more may exist",
            mode.pragma(),
            max_errors
        ));
    }

    IntegrityReport {
        check: mode.pragma().to_string(),
        total_errors: errors.len(),
        errors,
        warnings,
        check_failed: false,
    }
}

fn scan_failed(table: Option<&str>, reason: String) -> LogicalError {
    let (severity, message) = match table {
        Some(table) => (
            Severity::Medium,
            format!("Consistency scan of {} failed: {}", table, reason),
        ),
        None => (
            Severity::High,
            format!("Consistency scan failed: {}", reason),
        ),
    };

    LogicalError {
        kind: LogicalErrorKind::ScanFailed {
            table: table.map(str::to_string),
            reason,
        },
        severity,
        message,
    }
}

/// Columns of one foreign key constraint, in key order
struct ForeignKeyGroup {
    id: i64,
    parent: String,
    columns: Vec<String>,
    parent_columns: Vec<Option<String>>,
}

async fn foreign_key_groups(conn: &mut SqliteConnection, table: &str) -> Result<Vec<ForeignKeyGroup>> {
    let mut groups: Vec<ForeignKeyGroup> = Vec::new();
    for fk in sqlite::foreign_keys(conn, table).await? {
        match groups.last_mut() {
            Some(group) if group.id == fk.id => {
                group.columns.push(fk.column);
                group.parent_columns.push(fk.references_column);
            }
            _ => groups.push(ForeignKeyGroup {
                id: fk.id,
                parent: fk.references_table,
                columns: vec![fk.column],
                parent_columns: vec![fk.references_column],
            }),
        }
    }
    Ok(groups)
}

/// Violating child rows per foreign key id
async fn orphan_counts(conn: &mut SqliteConnection, table: &str) -> Result<BTreeMap<i64, u64>> {
    let sql = format!("PRAGMA foreign_key_check({})", quote_identifier(table));
    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AnalysisError::query(format!("foreign key check of {}", table), e))?;

    let mut counts = BTreeMap::new();
    for row in &rows {
        let fkid: i64 = row
            .try_get(3)
            .map_err(|e| AnalysisError::query(format!("foreign key check of {}", table), e))?;
        *counts.entry(fkid).or_default() += 1;
    }
    Ok(counts)
}

/// Record a failed rule scan as a finding; lock contention ends the scan
fn degrade(findings: &mut Vec<LogicalError>, table: Option<&str>, err: AnalysisError) -> Result<()> {
    if err.is_locked() {
        return Err(err);
    }
    findings.push(scan_failed(table, err.to_string()));
    Ok(())
}

async fn logical_scan(conn: &mut SqliteConnection) -> Result<Vec<LogicalError>> {
    let mut findings = Vec::new();
    let tables = match sqlite::list_tables(conn).await {
        Ok(tables) => tables,
        Err(e) => {
            degrade(&mut findings, None, e)?;
            return Ok(findings);
        }
    };
    let table_names: Vec<String> = tables.into_iter().map(|(name, _)| name).collect();
    let exists = |name: &str| table_names.iter().any(|t| t.eq_ignore_ascii_case(name));

    for table in &table_names {
        match foreign_key_groups(conn, table).await {
            Ok(groups) => {
                check_foreign_keys(conn, table, &groups, &exists, &mut findings).await?;
            }
            Err(e) => degrade(&mut findings, Some(table), e)?,
        }

        if let Err(e) = check_not_null(conn, table, &mut findings).await {
            degrade(&mut findings, Some(table), e)?;
        }
    }
    Ok(findings)
}

async fn check_foreign_keys(
    conn: &mut SqliteConnection,
    table: &str,
    groups: &[ForeignKeyGroup],
    exists: &impl Fn(&str) -> bool,
    findings: &mut Vec<LogicalError>,
) -> Result<()> {
    for group in groups.iter().filter(|g| !exists(&g.parent)) {
        findings.push(LogicalError {
            kind: LogicalErrorKind::MissingParentTable {
                table: table.to_string(),
                parent_table: group.parent.clone(),
            },
            severity: Severity::High,
            message: format!(
                "Foreign key on {}({}) references missing table {}",
                table,
                group.columns.join(", "),
                group.parent
            ),
        });
    }

    if !groups.iter().any(|g| exists(&g.parent)) {
        return Ok(());
    }

    let counts = match orphan_counts(conn, table).await {
        Ok(counts) => counts,
        Err(e) => return degrade(findings, Some(table), e),
    };

    for group in groups.iter().filter(|g| exists(&g.parent)) {
        let Some(&count) = counts.get(&group.id) else {
            continue;
        };

        let parent_columns = resolve_parent_columns(conn, group).await;
        findings.push(LogicalError {
            kind: LogicalErrorKind::OrphanedForeignKey {
                table: table.to_string(),
                columns: group.columns.clone(),
                parent_table: group.parent.clone(),
                parent_columns: parent_columns.clone(),
                count,
            },
            severity: Severity::Medium,
            message: format!(
                "{} row(s) in {}({}) reference missing rows in {}({})",
                count,
                table,
                group.columns.join(", "),
                group.parent,
                parent_columns.join(", ")
            ),
        });
    }
    Ok(())
}

/// Explicit parent columns, or the parent's primary key when omitted
async fn resolve_parent_columns(conn: &mut SqliteConnection, group: &ForeignKeyGroup) -> Vec<String> {
    if group.parent_columns.iter().all(Option::is_some) {
        return group.parent_columns.iter().flatten().cloned().collect();
    }

    match sqlite::primary_key(conn, &group.parent).await {
        Ok(keys) if !keys.is_empty() => keys,
        _ => vec!["rowid".to_string()],
    }
}

async fn check_not_null(
    conn: &mut SqliteConnection,
    table: &str,
    findings: &mut Vec<LogicalError>,
) -> Result<()> {
    let columns = sqlite::columns(conn, table).await?;

    for column in columns.iter().filter(|c| c.not_null) {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
            quote_identifier(table),
            quote_identifier(&column.name)
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| AnalysisError::query(format!("NULL scan of {}.{}", table, column.name), e))?;

        if count > 0 {
            findings.push(LogicalError {
                kind: LogicalErrorKind::NullInNotNull {
                    table: table.to_string(),
                    column: column.name.clone(),
                    count: count as u64,
                    default: column.default.clone(),
                },
                severity: Severity::High,
                message: format!(
                    "{} NULL value(s) in NOT NULL column {}.{}",
                    count, table, column.name
                ),
            });
        }
    }
    Ok(())
}

/// Corrective SQL for the given findings.
///
/// Statements are text for the caller to review and run; the analyzer never
/// executes them.
pub fn fixes_for(
    path: &Path,
    integrity: &IntegrityReport,
    corruption: &CorruptionReport,
    logical: &[LogicalError],
) -> Vec<SuggestedFix> {
    let mut fixes = Vec::new();

    if !integrity.check_failed && integrity.total_errors > 0 {
        let indexes: BTreeSet<&str> = integrity
            .errors
            .iter()
            .flat_map(|error| INDEX_NAME.captures_iter(error))
            .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
            .collect();

        if indexes.is_empty() {
            fixes.push(SuggestedFix {
                issue: "integrity_error".to_string(),
                severity: Severity::High,
                description: "Rebuild all indexes to repair index inconsistencies".to_string(),
                sql: "REINDEX;".to_string(),
            });
        }
        for index in indexes {
            fixes.push(SuggestedFix {
                issue: "integrity_error".to_string(),
                severity: Severity::High,
                description: format!("Rebuild index {}", index),
                sql: format!("REINDEX {};", quote_identifier(index)),
            });
        }
    }

    if corruption.corruption_detected {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "database".to_string());
        let target = path.with_file_name(format!("{}_recovered.db", stem));
        fixes.push(SuggestedFix {
            issue: "corruption".to_string(),
            severity: corruption.severity.unwrap_or(Severity::Critical),
            description: "Copy readable data into a new database file, then verify the copy".to_string(),
            sql: format!("VACUUM INTO {};", quote_literal(&target.to_string_lossy())),
        });
    }

    for error in logical {
        match &error.kind {
            LogicalErrorKind::OrphanedForeignKey {
                table,
                columns,
                parent_table,
                parent_columns,
                count,
            } => fixes.push(SuggestedFix {
                issue: "orphaned_foreign_key".to_string(),
                severity: error.severity,
                description: format!("Delete {} orphaned row(s) from {}", count, table),
                sql: orphan_delete(table, columns, parent_table, parent_columns),
            }),
            LogicalErrorKind::NullInNotNull {
                table,
                column,
                default,
                ..
            } => fixes.push(SuggestedFix {
                issue: "null_in_not_null".to_string(),
                severity: error.severity,
                description: format!("Replace NULL values in {}.{}", table, column),
                sql: format!(
                    "UPDATE {} SET {} = {} WHERE {} IS NULL;",
                    quote_identifier(table),
                    quote_identifier(column),
                    default.as_deref().unwrap_or("''"),
                    quote_identifier(column)
                ),
            }),
            LogicalErrorKind::MissingParentTable { .. } | LogicalErrorKind::ScanFailed { .. } => {}
        }
    }

    fixes
}

fn orphan_delete(table: &str, columns: &[String], parent: &str, parent_columns: &[String]) -> String {
    let child = quote_identifier(table);
    let parent_quoted = quote_identifier(parent);

    let not_null: Vec<String> = columns
        .iter()
        .map(|c| format!("{} IS NOT NULL", quote_identifier(c)))
        .collect();
    let join: Vec<String> = columns
        .iter()
        .zip(parent_columns)
        .map(|(c, p)| {
            format!(
                "{}.{} = {}.{}",
                parent_quoted,
                quote_identifier(p),
                child,
                quote_identifier(c)
            )
        })
        .collect();

    format!(
        "DELETE FROM {} WHERE {} AND NOT EXISTS (SELECT 1 FROM {} WHERE {});",
        child,
        not_null.join(" AND "),
        parent_quoted,
        join.join(" AND ")
    )
}
