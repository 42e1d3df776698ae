//! Operation dispatch and result envelope

use crate::content::ContentAnalyzer;
use crate::detector::{ErrorDetector, IntegrityMode, fixes_for};
use crate::error::Result;
use crate::health::HealthChecker;
use crate::report::ReportGenerator;
use crate::request::{AnalysisDepth, AnalysisOperation, AnalyzeDatabaseRequest};
use crate::structure::StructureAnalyzer;
use crate::types::{
    ColumnDistribution, ColumnPatterns, ContentSample, CorruptionReport, DatabaseType,
    HealthReport, InferredRelationship, IntegrityReport, LogicalError, SchemaDocument,
    SuggestedFix,
};
use dbscope_core::DbscopeConfig;
use dbscope_telemetry::{AnalysisSpanAttributes, analysis_span};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::Instrument;

/// Response of one dispatch call; always serializable, never an error
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(flatten)]
    pub payload: AnalysisPayload,
}

impl AnalysisResult {
    fn ok(operation: AnalysisOperation, payload: AnalysisPayload) -> Self {
        Self {
            success: true,
            operation: Some(operation.as_str().to_string()),
            payload,
        }
    }

    fn failure(operation: Option<AnalysisOperation>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            operation: operation.map(|op| op.as_str().to_string()),
            payload: AnalysisPayload::Failure {
                error: error.into(),
            },
        }
    }

    /// Error message of a failed call
    pub fn error(&self) -> Option<&str> {
        match &self.payload {
            AnalysisPayload::Failure { error } => Some(error),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self)
            .unwrap_or_else(|e| json!({"success": false, "error": format!("Serialization error: {}", e)}))
    }
}

/// Operation-specific fields, flattened into the envelope
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnalysisPayload {
    Analyze(Box<AnalyzePayload>),
    Structure {
        database_type: DatabaseType,
        file_path: String,
        file_size: u64,
        structure: SchemaDocument,
    },
    Content {
        database_type: DatabaseType,
        content: ContentPayload,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    Health {
        health: HealthReport,
    },
    Errors(ErrorsPayload),
    Report {
        report: String,
    },
    SuggestFixes {
        suggested_fixes: Vec<SuggestedFix>,
    },
    Failure {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzePayload {
    pub database_type: DatabaseType,
    pub file_path: String,
    pub file_size: u64,
    pub structure: SchemaDocument,
    pub health: HealthReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<ContentSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorFindings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fixes: Option<Vec<SuggestedFix>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentPayload {
    pub patterns: BTreeMap<String, ColumnPatterns>,
    pub distributions: BTreeMap<String, ColumnDistribution>,
    /// `None` when there is no table to sample
    pub samples: Option<ContentSample>,
    pub relationships: Vec<InferredRelationship>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorFindings {
    pub integrity: IntegrityReport,
    pub corruption: CorruptionReport,
    pub logical_errors: Vec<LogicalError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorsPayload {
    #[serde(flatten)]
    pub findings: ErrorFindings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fixes: Option<Vec<SuggestedFix>>,
}

/// Entry point routing an `AnalyzeDatabaseRequest` to the analyzers.
///
/// Holds configuration only; every call opens the target file afresh.
#[derive(Debug, Clone, Default)]
pub struct DatabaseAnalyzer {
    config: DbscopeConfig,
    structure: StructureAnalyzer,
    content: ContentAnalyzer,
    detector: ErrorDetector,
    health: HealthChecker,
    report: ReportGenerator,
}

impl DatabaseAnalyzer {
    pub fn from_config(config: DbscopeConfig) -> Self {
        let analysis = config.analysis.clone();
        let scoring = config.scoring.clone();
        Self {
            structure: StructureAnalyzer::new(analysis.clone()),
            content: ContentAnalyzer::new(analysis.clone()),
            detector: ErrorDetector::new(analysis.clone()),
            health: HealthChecker::new(analysis.clone(), scoring.clone()),
            report: ReportGenerator::new(analysis, scoring),
            config,
        }
    }

    pub fn config(&self) -> &DbscopeConfig {
        &self.config
    }

    /// Run one operation.
    ///
    /// Unknown operations and fatal failures (missing, unreadable or
    /// unrecognised files) come back as `success: false` with an `error`.
    pub async fn analyze(&self, request: &AnalyzeDatabaseRequest) -> AnalysisResult {
        let operation = match request.operation.parse::<AnalysisOperation>() {
            Ok(operation) => operation,
            Err(error) => {
                tracing::warn!(operation = %request.operation, "Rejected unknown operation");
                return AnalysisResult::failure(None, error);
            }
        };

        let span = analysis_span(&AnalysisSpanAttributes {
            operation: operation.as_str().to_string(),
            path: request.db_file_path.clone(),
            depth: request.analysis_depth.as_str().to_string(),
        });

        async move {
            tracing::info!("Analysis started");
            match self.dispatch(operation, request).await {
                Ok(payload) => {
                    tracing::info!("Analysis finished");
                    AnalysisResult::ok(operation, payload)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Analysis failed");
                    AnalysisResult::failure(Some(operation), e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        operation: AnalysisOperation,
        request: &AnalyzeDatabaseRequest,
    ) -> Result<AnalysisPayload> {
        let path = Path::new(&request.db_file_path);
        match operation {
            AnalysisOperation::Analyze => self.run_analyze(path, request).await,
            AnalysisOperation::Structure => self.run_structure(path).await,
            AnalysisOperation::Content => self.run_content(path, request).await,
            AnalysisOperation::Health => self.run_health(path, request).await,
            AnalysisOperation::Errors => self.run_errors(path, request).await,
            AnalysisOperation::Report => self.run_report(path, request).await,
            AnalysisOperation::SuggestFixes => self.run_suggest_fixes(path, request).await,
        }
    }

    /// Requested sample size clamped to `1..=max_sample_limit`
    fn sample_limit(&self, request: &AnalyzeDatabaseRequest) -> i64 {
        let analysis = &self.config.analysis;
        let max = i64::from(analysis.max_sample_limit.max(1));
        request
            .limit
            .unwrap_or_else(|| i64::from(analysis.default_sample_limit))
            .clamp(1, max)
    }

    fn integrity_mode(request: &AnalyzeDatabaseRequest) -> IntegrityMode {
        match request.analysis_depth {
            AnalysisDepth::Quick => IntegrityMode::Quick,
            AnalysisDepth::Standard | AnalysisDepth::Comprehensive => IntegrityMode::Full,
        }
    }

    async fn run_analyze(&self, path: &Path, request: &AnalyzeDatabaseRequest) -> Result<AnalysisPayload> {
        let quick = request.analysis_depth == AnalysisDepth::Quick;

        let info = self.structure.get_database_info(path).await?;
        let structure = self.structure.analyze_schema(path).await?;
        let assessment = self.health.assess(path, Self::integrity_mode(request)).await?;

        let sample_data = match structure.first_table() {
            Some(table) if request.include_sample_data && !quick => {
                let limit = self.sample_limit(request);
                match self.content.sample_content(path, &table.name, limit).await {
                    Ok(sample) => Some(sample),
                    Err(e) if e.is_locked() => return Err(e),
                    Err(e) => {
                        tracing::warn!(table = %table.name, error = %e, "Sample skipped");
                        None
                    }
                }
            }
            _ => None,
        };

        let (errors, suggested_fixes) = if request.detect_errors && !quick {
            let fixes = request.suggest_fixes.then(|| {
                fixes_for(
                    path,
                    &assessment.integrity,
                    &assessment.corruption,
                    &assessment.logical,
                )
            });
            let findings = ErrorFindings {
                integrity: assessment.integrity,
                corruption: assessment.corruption,
                logical_errors: assessment.logical,
            };
            (Some(findings), fixes)
        } else {
            (None, None)
        };

        Ok(AnalysisPayload::Analyze(Box::new(AnalyzePayload {
            database_type: info.database_type,
            file_path: info.file_path,
            file_size: info.file_size,
            structure,
            health: assessment.report,
            sample_data,
            errors,
            suggested_fixes,
        })))
    }

    async fn run_structure(&self, path: &Path) -> Result<AnalysisPayload> {
        let info = self.structure.get_database_info(path).await?;
        let structure = self.structure.analyze_schema(path).await?;

        Ok(AnalysisPayload::Structure {
            database_type: info.database_type,
            file_path: info.file_path,
            file_size: info.file_size,
            structure,
        })
    }

    async fn run_content(&self, path: &Path, request: &AnalyzeDatabaseRequest) -> Result<AnalysisPayload> {
        let schema = self.structure.analyze_schema(path).await?;

        let relationships = match self.content.infer_relationships(path).await {
            Ok(relationships) => relationships,
            Err(e) if e.is_locked() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Relationship inference skipped");
                Vec::new()
            }
        };

        let table = request
            .table_name
            .clone()
            .or_else(|| schema.first_table().map(|t| t.name.clone()));
        let Some(table) = table else {
            tracing::debug!("No tables to sample");
            return Ok(AnalysisPayload::Content {
                database_type: schema.database_type,
                content: ContentPayload {
                    patterns: BTreeMap::new(),
                    distributions: BTreeMap::new(),
                    samples: None,
                    relationships,
                },
                warning: None,
            });
        };

        let limit = self.sample_limit(request);
        let (mut samples, warning) = match self.content.sample_content(path, &table, limit).await {
            Ok(samples) => (samples, None),
            Err(e) if e.is_table_scoped() => {
                tracing::warn!(table = %table, error = %e, "Content sample degraded");
                (ContentSample::empty(table.clone()), Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        let profile = if warning.is_none() && request.analysis_depth != AnalysisDepth::Quick {
            match self.content.profile_table(path, &samples.table_name).await {
                Ok(profile) => Some(profile),
                Err(e) if e.is_locked() => return Err(e),
                Err(e) => {
                    tracing::warn!(table = %table, error = %e, "Profiling skipped");
                    None
                }
            }
        } else {
            None
        };

        let patterns = profile.as_ref().map(|p| p.patterns()).unwrap_or_default();
        let distributions = profile.as_ref().map(|p| p.distributions()).unwrap_or_default();
        samples.patterns.clone_from(&patterns);
        samples.distributions.clone_from(&distributions);

        Ok(AnalysisPayload::Content {
            database_type: schema.database_type,
            content: ContentPayload {
                patterns,
                distributions,
                samples: Some(samples),
                relationships,
            },
            warning,
        })
    }

    async fn run_health(&self, path: &Path, request: &AnalyzeDatabaseRequest) -> Result<AnalysisPayload> {
        let assessment = self.health.assess(path, Self::integrity_mode(request)).await?;
        Ok(AnalysisPayload::Health {
            health: assessment.report,
        })
    }

    async fn collect_findings(&self, path: &Path, request: &AnalyzeDatabaseRequest) -> Result<ErrorFindings> {
        let integrity = self
            .detector
            .check_integrity_with(path, Self::integrity_mode(request))
            .await?;
        let corruption = self.detector.assess_corruption(path, &integrity).await?;
        let logical_errors = self.detector.find_logical_errors(path).await?;

        Ok(ErrorFindings {
            integrity,
            corruption,
            logical_errors,
        })
    }

    async fn run_errors(&self, path: &Path, request: &AnalyzeDatabaseRequest) -> Result<AnalysisPayload> {
        let findings = self.collect_findings(path, request).await?;
        let suggested_fixes = request.suggest_fixes.then(|| {
            fixes_for(
                path,
                &findings.integrity,
                &findings.corruption,
                &findings.logical_errors,
            )
        });

        Ok(AnalysisPayload::Errors(ErrorsPayload {
            findings,
            suggested_fixes,
        }))
    }

    async fn run_report(&self, path: &Path, request: &AnalyzeDatabaseRequest) -> Result<AnalysisPayload> {
        let report = self
            .report
            .generate_report_with(path, request.include_sample_data, Self::integrity_mode(request))
            .await?;
        Ok(AnalysisPayload::Report { report })
    }

    async fn run_suggest_fixes(&self, path: &Path, request: &AnalyzeDatabaseRequest) -> Result<AnalysisPayload> {
        let findings = self.collect_findings(path, request).await?;
        Ok(AnalysisPayload::SuggestFixes {
            suggested_fixes: fixes_for(
                path,
                &findings.integrity,
                &findings.corruption,
                &findings.logical_errors,
            ),
        })
    }
}
