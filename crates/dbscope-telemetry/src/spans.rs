//! Span helpers for analysis calls and tool executions

use crate::attributes::*;
use tracing::Span;

/// Attributes identifying one analysis dispatch
#[derive(Debug, Clone)]
pub struct AnalysisSpanAttributes {
    pub operation: String,
    pub path: String,
    pub depth: String,
}

/// Attributes of a finished tool call
#[derive(Debug, Clone)]
pub struct ToolSpanAttributes {
    pub tool_name: String,
    pub tool_call_id: String,
    pub invocation_id: String,
    pub args_json: String,
    pub success: bool,
}

/// Create the span an analysis dispatch runs inside.
///
/// The caller instruments the dispatch future with it, so every analyzer
/// event logged during the call carries the operation and file path.
pub fn analysis_span(attrs: &AnalysisSpanAttributes) -> Span {
    tracing::info_span!(
        "analyze_database",
        { ANALYSIS_OPERATION } = %attrs.operation,
        { ANALYSIS_PATH } = %attrs.path,
        { ANALYSIS_DEPTH } = %attrs.depth,
    )
}

/// Record a span for a completed tool execution.
pub fn trace_tool_call(attrs: ToolSpanAttributes) {
    let span = tracing::info_span!(
        "execute_tool",
        { TOOL_NAME } = %attrs.tool_name,
        { TOOL_CALL_ID } = %attrs.tool_call_id,
        { TOOL_INVOCATION_ID } = %attrs.invocation_id,
        { TOOL_ARGS } = %attrs.args_json,
        { TOOL_SUCCESS } = attrs.success,
    );

    let _guard = span.enter();
}

/// Serialize to a JSON string for span attributes, never failing
pub fn safe_serialize<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<not serializable>".to_string())
}
