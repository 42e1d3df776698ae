//! Parameters of the analysis dispatch

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operations the dispatch routes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisOperation {
    Analyze,
    Structure,
    Content,
    Health,
    Errors,
    Report,
    SuggestFixes,
}

impl AnalysisOperation {
    pub const ALL: [AnalysisOperation; 7] = [
        AnalysisOperation::Analyze,
        AnalysisOperation::Structure,
        AnalysisOperation::Content,
        AnalysisOperation::Health,
        AnalysisOperation::Errors,
        AnalysisOperation::Report,
        AnalysisOperation::SuggestFixes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisOperation::Analyze => "analyze",
            AnalysisOperation::Structure => "structure",
            AnalysisOperation::Content => "content",
            AnalysisOperation::Health => "health",
            AnalysisOperation::Errors => "errors",
            AnalysisOperation::Report => "report",
            AnalysisOperation::SuggestFixes => "suggest_fixes",
        }
    }
}

impl fmt::Display for AnalysisOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("Unknown operation: {}", s))
    }
}

/// How much work an analysis may spend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    /// Skip sampling and error detection; use the quick integrity check
    Quick,
    Standard,
    #[default]
    Comprehensive,
}

impl AnalysisDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDepth::Quick => "quick",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Comprehensive => "comprehensive",
        }
    }
}

/// Arguments of one analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeDatabaseRequest {
    /// Path to an existing database file
    pub db_file_path: String,

    /// One of analyze, structure, content, health, errors, report, suggest_fixes
    #[serde(default = "default_operation")]
    pub operation: String,

    /// quick, standard or comprehensive
    #[serde(default)]
    pub analysis_depth: AnalysisDepth,

    /// Include a sample of the first table (analyze, report)
    #[serde(default = "default_true")]
    pub include_sample_data: bool,

    /// Run integrity, corruption and logical checks (analyze)
    #[serde(default = "default_true")]
    pub detect_errors: bool,

    /// Add corrective SQL to error results (analyze, errors)
    #[serde(default = "default_true")]
    pub suggest_fixes: bool,

    /// Table to sample; defaults to the first table (content)
    #[serde(default)]
    pub table_name: Option<String>,

    /// Sample rows per table, clamped to 1..=100 by default
    #[serde(default)]
    pub limit: Option<i64>,
}

fn default_operation() -> String {
    AnalysisOperation::Analyze.as_str().to_string()
}

fn default_true() -> bool {
    true
}

impl AnalyzeDatabaseRequest {
    /// Request with every option at its default
    pub fn new(db_file_path: impl Into<String>) -> Self {
        Self {
            db_file_path: db_file_path.into(),
            operation: default_operation(),
            analysis_depth: AnalysisDepth::default(),
            include_sample_data: true,
            detect_errors: true,
            suggest_fixes: true,
            table_name: None,
            limit: None,
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn with_depth(mut self, depth: AnalysisDepth) -> Self {
        self.analysis_depth = depth;
        self
    }

    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_round_trip_names() {
        for op in AnalysisOperation::ALL {
            assert_eq!(op.as_str().parse::<AnalysisOperation>(), Ok(op));
        }
        assert_eq!(
            "vacuum".parse::<AnalysisOperation>(),
            Err("Unknown operation: vacuum".to_string())
        );
    }

    #[test]
    fn test_request_defaults() {
        let request: AnalyzeDatabaseRequest =
            serde_json::from_value(json!({"db_file_path": "library.db"})).unwrap();

        assert_eq!(request, AnalyzeDatabaseRequest::new("library.db"));
        assert_eq!(request.operation, "analyze");
        assert_eq!(request.analysis_depth, AnalysisDepth::Comprehensive);
        assert!(request.include_sample_data && request.detect_errors && request.suggest_fixes);
        assert_eq!(request.limit, None);
    }

    #[test]
    fn test_request_parses_depth() {
        let request: AnalyzeDatabaseRequest = serde_json::from_value(json!({
            "db_file_path": "library.db",
            "operation": "content",
            "analysis_depth": "quick",
            "table_name": "books",
            "limit": 5
        }))
        .unwrap();

        assert_eq!(request.analysis_depth, AnalysisDepth::Quick);
        assert_eq!(request.table_name.as_deref(), Some("books"));
        assert_eq!(request.limit, Some(5));

        let invalid = serde_json::from_value::<AnalyzeDatabaseRequest>(json!({
            "db_file_path": "library.db",
            "analysis_depth": "exhaustive"
        }));
        assert!(invalid.is_err());
    }
}
