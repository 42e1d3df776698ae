//! # dbscope telemetry
//!
//! Logging and tracing setup for dbscope. Analysis calls and tool executions
//! are recorded as `tracing` spans with stable attribute names, which the
//! OpenTelemetry bridge forwards to any registered span processor.

mod spans;
mod tracer;

pub use spans::{
    AnalysisSpanAttributes, ToolSpanAttributes, analysis_span, safe_serialize, trace_tool_call,
};
pub use tracer::{init_telemetry, register_span_processor, tracer_provider};

/// Span attribute names used across dbscope.
pub mod attributes {
    pub const ANALYSIS_OPERATION: &str = "dbscope.analysis.operation";
    pub const ANALYSIS_PATH: &str = "dbscope.analysis.path";
    pub const ANALYSIS_DEPTH: &str = "dbscope.analysis.depth";

    pub const TOOL_NAME: &str = "dbscope.tool.name";
    pub const TOOL_CALL_ID: &str = "dbscope.tool.call_id";
    pub const TOOL_INVOCATION_ID: &str = "dbscope.tool.invocation_id";
    pub const TOOL_SUCCESS: &str = "dbscope.tool.success";
    pub const TOOL_ARGS: &str = "dbscope.tool.args";
}
