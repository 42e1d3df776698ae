//! Value types produced by the analyzers
//!
//! Everything here is built fresh for each call and owned by the caller;
//! nothing is cached between analyses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Database format recognised from a file signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseType {
    Sqlite,
    Postgresql,
    Mysql,
    GenericSql,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Postgresql => "postgresql",
            DatabaseType::Mysql => "mysql",
            DatabaseType::GenericSql => "generic_sql",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File-level metadata returned by `get_database_info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub database_type: DatabaseType,
    pub file_path: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freelist_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_version: Option<String>,
}

/// Normalized schema of one database file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub database_type: DatabaseType,
    /// Base tables in schema order, internal `sqlite_` tables excluded
    pub tables: Vec<TableDescriptor>,
    pub views: Vec<NamedDefinition>,
    pub triggers: Vec<NamedDefinition>,
    pub summary: SchemaSummary,
}

impl SchemaDocument {
    /// First table in schema order, the default target for sampling
    pub fn first_table(&self) -> Option<&TableDescriptor> {
        self.tables.first()
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .find(|table| table.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub table_count: usize,
    pub view_count: usize,
    pub trigger_count: usize,
    pub index_count: usize,
    pub total_rows: u64,
}

/// A view or trigger with its raw DDL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedDefinition {
    pub name: String,
    pub definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    /// Raw CREATE statement, for display only
    pub sql: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
    /// Primary key columns in key order
    pub primary_key: Vec<String>,
    pub row_count: u64,
    /// Best-effort on-disk size; 0 when the engine cannot report it
    pub size_bytes: u64,
    pub indexes: Vec<IndexDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// Per-table reads that failed and were degraded to empty values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
    /// Declaration order, starting at 0
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// `c` for CREATE INDEX, `u` for UNIQUE constraints, `pk` for primary keys
    pub origin: String,
    pub partial: bool,
}

/// One column pair of a foreign key; composite keys share an `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub id: i64,
    pub column: String,
    pub references_table: String,
    /// `None` when the constraint targets the parent's primary key implicitly
    pub references_column: Option<String>,
    pub on_update: String,
    pub on_delete: String,
}

/// Leading rows of a table plus light statistics over them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSample {
    pub table_name: String,
    /// Total rows in the table, not the sample size
    pub row_count: u64,
    pub sample_rows: Vec<Map<String, Value>>,
    pub column_statistics: BTreeMap<String, ColumnStatistics>,
    pub patterns: BTreeMap<String, ColumnPatterns>,
    pub distributions: BTreeMap<String, ColumnDistribution>,
}

impl ContentSample {
    pub fn empty(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            row_count: 0,
            sample_rows: Vec::new(),
            column_statistics: BTreeMap::new(),
            patterns: BTreeMap::new(),
            distributions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub null_count: u64,
    pub non_null_count: u64,
    pub unique_values: u64,
    pub sample_values: Vec<String>,
}

/// Value patterns recognised in one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPatterns {
    /// Pattern names, most frequent first
    pub detected_patterns: Vec<String>,
    pub match_counts: BTreeMap<String, u64>,
    /// Share of non-null values matching the dominant pattern
    pub confidence: f64,
    pub sample_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDistribution {
    pub unique_value_count: u64,
    /// True when distinct tracking hit its cap and the count is a lower bound
    pub distinct_capped: bool,
    pub null_count: u64,
    pub non_null_count: u64,
    pub unique_ratio: f64,
    pub storage_classes: StorageClassCounts,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub top_values: Vec<ValueFrequency>,
    pub sample_unique_values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageClassCounts {
    pub integer: u64,
    pub real: u64,
    pub text: u64,
    pub blob: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueFrequency {
    pub value: String,
    pub count: u64,
}

/// Foreign key candidate guessed from column naming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredRelationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub relationship_type: String,
    pub confidence: f64,
}

/// Severity of a finding; ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the engine's structural integrity check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Pragma that produced the report: `integrity_check` or `quick_check`
    pub check: String,
    pub total_errors: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// The check itself could not run, so `errors` holds the engine failure
    pub check_failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptionReport {
    pub corruption_detected: bool,
    pub issues: Vec<String>,
    pub severity: Option<Severity>,
    pub recommendation: String,
}

/// Application-level consistency violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalError {
    #[serde(flatten)]
    pub kind: LogicalErrorKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum LogicalErrorKind {
    /// Child rows whose key matches no parent row
    OrphanedForeignKey {
        table: String,
        columns: Vec<String>,
        parent_table: String,
        parent_columns: Vec<String>,
        count: u64,
    },
    /// NULL values stored in a column declared NOT NULL
    NullInNotNull {
        table: String,
        column: String,
        count: u64,
        default: Option<String>,
    },
    /// Foreign key naming a table that does not exist
    MissingParentTable { table: String, parent_table: String },
    /// A rule could not be evaluated
    ScanFailed { table: Option<String>, reason: String },
}

/// Corrective SQL for a finding; text only, never executed by dbscope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedFix {
    pub issue: String,
    pub severity: Severity,
    pub description: String,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_score: f64,
    pub integrity_score: f64,
    pub corruption_score: f64,
    pub logical_score: f64,
    pub performance_score: f64,
    pub issues: Vec<HealthIssue>,
    pub recommendations: Vec<String>,
    pub total_issues: usize,
    pub health_status: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Integrity,
    Corruption,
    Logical,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::Integrity => "integrity",
            IssueKind::Corruption => "corruption",
            IssueKind::Logical => "logical",
        })
    }
}

/// Discrete label over the overall health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Critical,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl HealthStatus {
    /// Each band includes its lower bound: 90 is excellent, 89.99 is good.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthStatus::Excellent
        } else if score >= 75.0 {
            HealthStatus::Good
        } else if score >= 50.0 {
            HealthStatus::Fair
        } else if score >= 25.0 {
            HealthStatus::Poor
        } else {
            HealthStatus::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Excellent => "excellent",
            HealthStatus::Good => "good",
            HealthStatus::Fair => "fair",
            HealthStatus::Poor => "poor",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
