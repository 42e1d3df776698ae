//! # dbscope analysis
//!
//! Read-only analysis of SQLite database files.
//!
//! The analyzers build on each other: [`StructureAnalyzer`] describes the
//! schema, [`ContentAnalyzer`] samples and profiles rows, [`ErrorDetector`]
//! runs integrity, corruption and logical checks, [`HealthChecker`] scores
//! the findings and [`ReportGenerator`] renders everything as Markdown.
//! [`DatabaseAnalyzer`] routes an [`AnalyzeDatabaseRequest`] to them and
//! [`AnalysisTool`] exposes that dispatch as the `db_analysis` tool.
//!
//! Every connection is opened read-only with `query_only` set; the target
//! file is never written.
//!
//! ```no_run
//! use dbscope_analysis::{AnalyzeDatabaseRequest, DatabaseAnalyzer};
//!
//! # async fn run() {
//! let analyzer = DatabaseAnalyzer::default();
//! let request = AnalyzeDatabaseRequest::new("library.db").with_operation("health");
//! let result = analyzer.analyze(&request).await;
//! println!("{}", result.to_json());
//! # }
//! ```

mod content;
mod detector;
mod dispatch;
mod error;
mod header;
mod health;
mod report;
mod request;
mod sqlite;
mod structure;
mod tool;
mod types;
mod value;

#[cfg(test)]
mod test_fixtures;

pub use content::{ColumnProfile, ContentAnalyzer, TableProfile};
pub use detector::{ErrorDetector, IntegrityMode, fixes_for};
pub use dispatch::{
    AnalysisPayload, AnalysisResult, AnalyzePayload, ContentPayload, DatabaseAnalyzer,
    ErrorFindings, ErrorsPayload,
};
pub use error::{AnalysisError, Result};
pub use header::{FileHeader, sniff_database_type};
pub use health::{HealthAssessment, HealthChecker, ScoreInputs, score};
pub use report::{ReportGenerator, ReportInputs, render};
pub use request::{AnalysisDepth, AnalysisOperation, AnalyzeDatabaseRequest};
pub use sqlite::{quote_identifier, quote_literal};
pub use structure::StructureAnalyzer;
pub use tool::{AnalysisTool, TOOL_NAME, create_analysis_tool};
pub use types::*;
