//! `db_analysis` tool exposing the dispatch to agents

use crate::dispatch::DatabaseAnalyzer;
use crate::request::AnalyzeDatabaseRequest;
use async_trait::async_trait;
use dbscope_core::{DbscopeConfig, Error, Result, Tool, ToolContext, ToolResponse, generate_schema};
use dbscope_telemetry::{ToolSpanAttributes, safe_serialize, trace_tool_call};
use serde_json::{Value, json};
use std::sync::Arc;

pub const TOOL_NAME: &str = "db_analysis";

const DESCRIPTION: &str = "Analyze a SQLite database file without modifying it. Operations: \
analyze (full analysis), structure (schema), content (samples, patterns, distributions), \
health (scored health report), errors (integrity, corruption and logical checks), \
report (Markdown report), suggest_fixes (corrective SQL).";

/// Tool wrapping a `DatabaseAnalyzer`
pub struct AnalysisTool {
    analyzer: DatabaseAnalyzer,
    schema: Value,
}

impl AnalysisTool {
    pub fn new(analyzer: DatabaseAnalyzer) -> Self {
        Self {
            analyzer,
            schema: generate_schema::<AnalyzeDatabaseRequest>(),
        }
    }
}

#[async_trait]
impl Tool for AnalysisTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn schema(&self) -> Value {
        self.schema.clone()
    }

    fn is_long_running(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: Arc<dyn ToolContext>, params: Value) -> Result<ToolResponse> {
        let args_json = safe_serialize(&params);

        let result = match serde_json::from_value::<AnalyzeDatabaseRequest>(params) {
            Ok(request) => {
                tracing::debug!(
                    invocation_id = %ctx.invocation_id(),
                    operation = %request.operation,
                    path = %request.db_file_path,
                    "Running database analysis"
                );
                self.analyzer.analyze(&request).await.to_json()
            }
            Err(e) => {
                let err = Error::InvalidParameters(e.to_string());
                tracing::debug!(
                    invocation_id = %ctx.invocation_id(),
                    error = %err,
                    "Rejected analysis parameters"
                );
                json!({"success": false, "error": err.to_string()})
            }
        };

        trace_tool_call(ToolSpanAttributes {
            tool_name: TOOL_NAME.to_string(),
            tool_call_id: ctx.function_call_id().to_string(),
            invocation_id: ctx.invocation_id().to_string(),
            args_json,
            success: result["success"].as_bool().unwrap_or(false),
        });

        Ok(ToolResponse { result })
    }
}

/// Create the `db_analysis` tool from loaded configuration
pub fn create_analysis_tool(config: DbscopeConfig) -> Arc<dyn Tool> {
    Arc::new(AnalysisTool::new(DatabaseAnalyzer::from_config(config)))
}
