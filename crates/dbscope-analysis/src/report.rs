//! Markdown report rendering

use crate::content::ContentAnalyzer;
use crate::detector::IntegrityMode;
use crate::error::Result;
use crate::health::HealthChecker;
use crate::structure::StructureAnalyzer;
use crate::types::{ContentSample, DatabaseInfo, HealthReport, SchemaDocument};
use dbscope_core::{AnalysisConfig, ScoringPolicy};
use serde_json::Value;
use std::fmt;
use std::path::Path;

const REPORT_SAMPLE_ROWS: usize = 3;

/// Everything a report shows, gathered before rendering
#[derive(Debug, Clone)]
pub struct ReportInputs<'a> {
    pub generated_at: String,
    pub file_name: String,
    pub info: &'a DatabaseInfo,
    pub schema: &'a SchemaDocument,
    pub health: &'a HealthReport,
    pub sample: Option<&'a ContentSample>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportGenerator {
    config: AnalysisConfig,
    structure: StructureAnalyzer,
    content: ContentAnalyzer,
    health: HealthChecker,
}

impl ReportGenerator {
    pub fn new(config: AnalysisConfig, policy: ScoringPolicy) -> Self {
        Self {
            structure: StructureAnalyzer::new(config.clone()),
            content: ContentAnalyzer::new(config.clone()),
            health: HealthChecker::new(config.clone(), policy),
            config,
        }
    }

    pub async fn generate_report(&self, path: &Path, include_samples: bool) -> Result<String> {
        self.generate_report_with(path, include_samples, IntegrityMode::Full).await
    }

    /// Gather structure, health and an optional sample of the first table,
    /// then render them as Markdown.
    pub async fn generate_report_with(
        &self,
        path: &Path,
        include_samples: bool,
        mode: IntegrityMode,
    ) -> Result<String> {
        let info = self.structure.get_database_info(path).await?;
        let schema = self.structure.analyze_schema(path).await?;
        let health = self.health.assess(path, mode).await?.report;

        let sample = match schema.first_table() {
            Some(table) if include_samples => {
                let limit = i64::from(self.config.default_sample_limit);
                match self.content.sample_content(path, &table.name, limit).await {
                    Ok(sample) => Some(sample),
                    Err(e) if e.is_locked() => return Err(e),
                    Err(e) => {
                        tracing::warn!(table = %table.name, error = %e, "Report sample skipped");
                        None
                    }
                }
            }
            _ => None,
        };

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(render(&ReportInputs {
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            file_name,
            info: &info,
            schema: &schema,
            health: &health,
            sample: sample.as_ref(),
        }))
    }
}

/// Render the report; output depends only on `inputs`
pub fn render(inputs: &ReportInputs<'_>) -> String {
    inputs.to_string()
}

impl fmt::Display for ReportInputs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Database Analysis Report")?;
        writeln!(f)?;
        writeln!(f, "**Generated:** {}", self.generated_at)?;
        writeln!(f, "**Database:** {}", self.file_name)?;
        writeln!(f, "**Type:** {}", self.info.database_type)?;
        writeln!(
            f,
            "**File Size:** {:.2} MB",
            self.info.file_size as f64 / 1024.0 / 1024.0
        )?;
        writeln!(f)?;

        let health = self.health;
        writeln!(f, "## Health Summary")?;
        writeln!(f)?;
        writeln!(
            f,
            "**Overall Score:** {:.2}/100 ({})",
            health.overall_score, health.health_status
        )?;
        writeln!(f, "- Integrity: {:.2}/100", health.integrity_score)?;
        writeln!(f, "- Corruption: {:.2}/100", health.corruption_score)?;
        writeln!(f, "- Logical: {:.2}/100", health.logical_score)?;
        writeln!(f, "- Performance: {:.2}/100", health.performance_score)?;
        writeln!(f)?;

        if health.total_issues > 0 {
            writeln!(f, "### Issues Found")?;
            writeln!(f)?;
            for issue in &health.issues {
                writeln!(
                    f,
                    "- **{}** ({}): {}",
                    issue.severity.as_str().to_uppercase(),
                    issue.kind,
                    issue.message
                )?;
            }
            writeln!(f)?;
        }

        if !health.recommendations.is_empty() {
            writeln!(f, "### Recommendations")?;
            writeln!(f)?;
            for recommendation in &health.recommendations {
                writeln!(f, "- {}", recommendation)?;
            }
            writeln!(f)?;
        }

        let summary = &self.schema.summary;
        writeln!(f, "## Database Structure")?;
        writeln!(f)?;
        writeln!(f, "**Tables:** {}", summary.table_count)?;
        writeln!(f, "**Views:** {}", summary.view_count)?;
        writeln!(f, "**Triggers:** {}", summary.trigger_count)?;
        writeln!(f)?;

        writeln!(f, "### Tables")?;
        writeln!(f)?;
        for table in &self.schema.tables {
            writeln!(f, "#### {}", table.name)?;
            writeln!(f)?;
            writeln!(f, "- Rows: {}", thousands(table.row_count))?;
            writeln!(f, "- Size: {:.2} KB", table.size_bytes as f64 / 1024.0)?;
            writeln!(f, "- Columns: {}", table.columns.len())?;
            writeln!(f, "- Indexes: {}", table.indexes.len())?;
            writeln!(f, "- Foreign Keys: {}", table.foreign_keys.len())?;
            writeln!(f)?;

            if !table.columns.is_empty() {
                writeln!(f, "**Columns:**")?;
                writeln!(f)?;
                for column in &table.columns {
                    let nullability = if column.not_null { "NOT NULL" } else { "NULL" };
                    let key = if column.primary_key { " PRIMARY KEY" } else { "" };
                    writeln!(
                        f,
                        "- `{}` ({}) {}{}",
                        column.name, column.data_type, nullability, key
                    )?;
                }
                writeln!(f)?;
            }
        }

        if let Some(sample) = self.sample {
            writeln!(f, "## Content Sample")?;
            writeln!(f)?;
            writeln!(f, "### {}", sample.table_name)?;
            writeln!(f)?;
            writeln!(f, "Total Rows: {}", thousands(sample.row_count))?;

            if !sample.sample_rows.is_empty() {
                writeln!(f)?;
                writeln!(f, "**Sample Rows:**")?;
                writeln!(f)?;
                writeln!(f, "```")?;
                for (i, row) in sample.sample_rows.iter().take(REPORT_SAMPLE_ROWS).enumerate() {
                    writeln!(f, "Row {}:", i + 1)?;
                    for (key, value) in row {
                        writeln!(f, "  {}: {}", key, display_value(value))?;
                    }
                }
                writeln!(f, "```")?;
            }
        }

        Ok(())
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Format with comma thousands separators: 1234567 → 1,234,567
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::library_fixture;
    use crate::types::{
        ColumnDescriptor, DatabaseType, HealthIssue, HealthStatus, IssueKind, SchemaSummary,
        Severity, TableDescriptor,
    };
    use serde_json::{Map, json};
    use std::collections::BTreeMap;

    fn info() -> DatabaseInfo {
        DatabaseInfo {
            database_type: DatabaseType::Sqlite,
            file_path: "/data/library.db".to_string(),
            file_size: 2 * 1024 * 1024,
            page_count: None,
            page_size: None,
            freelist_count: None,
            encoding: None,
            journal_mode: None,
            sqlite_version: None,
        }
    }

    fn schema() -> SchemaDocument {
        SchemaDocument {
            database_type: DatabaseType::Sqlite,
            tables: vec![TableDescriptor {
                name: "books".to_string(),
                sql: None,
                columns: vec![
                    ColumnDescriptor {
                        name: "id".to_string(),
                        data_type: "INTEGER".to_string(),
                        not_null: false,
                        nullable: true,
                        default: None,
                        primary_key: true,
                        position: 0,
                    },
                    ColumnDescriptor {
                        name: "title".to_string(),
                        data_type: "TEXT".to_string(),
                        not_null: true,
                        nullable: false,
                        default: None,
                        primary_key: false,
                        position: 1,
                    },
                ],
                primary_key: vec!["id".to_string()],
                row_count: 1_234_567,
                size_bytes: 2048,
                indexes: Vec::new(),
                foreign_keys: Vec::new(),
                warnings: Vec::new(),
            }],
            views: Vec::new(),
            triggers: Vec::new(),
            summary: SchemaSummary {
                table_count: 1,
                total_rows: 1_234_567,
                ..SchemaSummary::default()
            },
        }
    }

    fn health(issues: Vec<HealthIssue>) -> HealthReport {
        HealthReport {
            overall_score: 97.5,
            integrity_score: 100.0,
            corruption_score: 100.0,
            logical_score: 90.0,
            performance_score: 100.0,
            total_issues: issues.len(),
            issues,
            recommendations: vec!["Database is in good health".to_string()],
            health_status: HealthStatus::Excellent,
        }
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_render_section_order() {
        let info = info();
        let schema = schema();
        let health = health(vec![HealthIssue {
            kind: IssueKind::Logical,
            severity: Severity::Medium,
            message: "2 row(s) in books(author_id) reference missing rows".to_string(),
        }]);

        let mut row = Map::new();
        row.insert("id".to_string(), json!(1));
        row.insert("title".to_string(), json!("A Wizard of Earthsea"));
        row.insert("subtitle".to_string(), Value::Null);
        let sample = ContentSample {
            table_name: "books".to_string(),
            row_count: 1_234_567,
            sample_rows: vec![row.clone(), row.clone(), row.clone(), row],
            column_statistics: BTreeMap::new(),
            patterns: BTreeMap::new(),
            distributions: BTreeMap::new(),
        };

        let report = render(&ReportInputs {
            generated_at: "2026-01-02 03:04:05".to_string(),
            file_name: "library.db".to_string(),
            info: &info,
            schema: &schema,
            health: &health,
            sample: Some(&sample),
        });

        let sections = [
            "# Database Analysis Report",
            "**Generated:** 2026-01-02 03:04:05",
            "**File Size:** 2.00 MB",
            "## Health Summary",
            "**Overall Score:** 97.50/100 (excellent)",
            "### Issues Found",
            "- **MEDIUM** (logical): 2 row(s)",
            "### Recommendations",
            "## Database Structure",
            "#### books",
            "- Rows: 1,234,567",
            "- Size: 2.00 KB",
            "- `id` (INTEGER) NULL PRIMARY KEY",
            "- `title` (TEXT) NOT NULL\n",
            "## Content Sample",
            "Total Rows: 1,234,567",
            "Row 1:",
            "  title: A Wizard of Earthsea",
            "  subtitle: NULL",
            "Row 3:",
        ];
        let mut cursor = 0;
        for section in sections {
            let found = report[cursor..]
                .find(section)
                .unwrap_or_else(|| panic!("missing or out of order: {}", section));
            cursor += found + section.len();
        }
        assert!(!report.contains("Row 4:"));
    }

    #[test]
    fn test_render_without_issues_or_sample() {
        let info = info();
        let schema = schema();
        let health = health(Vec::new());
        let report = render(&ReportInputs {
            generated_at: "2026-01-02 03:04:05".to_string(),
            file_name: "library.db".to_string(),
            info: &info,
            schema: &schema,
            health: &health,
            sample: None,
        });

        assert!(!report.contains("### Issues Found"));
        assert!(!report.contains("## Content Sample"));
    }

    #[tokio::test]
    async fn test_generate_report_for_fixture() {
        let fixture = library_fixture().await;
        let generator = ReportGenerator::default();

        let report = generator.generate_report(fixture.path(), true).await.unwrap();
        assert!(report.contains("**Database:** fixture.db"));
        assert!(report.contains("**Type:** sqlite"));
        assert!(report.contains("**Overall Score:** 100.00/100 (excellent)"));
        assert!(report.contains("**Tables:** 2"));
        assert!(report.contains("## Content Sample\n\n### authors\n"));
        assert!(report.contains("  name: Ursula K. Le Guin"));

        let without = generator.generate_report(fixture.path(), false).await.unwrap();
        assert!(!without.contains("## Content Sample"));
    }
}
