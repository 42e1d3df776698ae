//! Tool abstraction the analysis dispatch is exposed through

use crate::Result;
use async_trait::async_trait;
use schemars::{JsonSchema, schema_for};
use serde_json::Value;
use std::sync::Arc;

/// Tool trait - a single callable operation with a JSON parameter schema
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the name of the tool
    fn name(&self) -> &str;

    /// Returns a description of what the tool does
    fn description(&self) -> &str;

    /// Returns the JSON schema for the tool's parameters
    fn schema(&self) -> Value;

    /// Indicates whether a call may take long enough to warrant progress reporting
    fn is_long_running(&self) -> bool {
        false
    }

    /// Executes the tool with given parameters
    async fn execute(&self, ctx: Arc<dyn ToolContext>, params: Value) -> Result<ToolResponse>;
}

/// Context provided during tool execution
pub trait ToolContext: Send + Sync {
    fn function_call_id(&self) -> &str;
    fn invocation_id(&self) -> &str;
}

/// Tool execution response
#[derive(Debug, Clone)]
pub struct ToolResponse {
    pub result: Value,
}

/// Default implementation of ToolContext
#[derive(Debug, Clone)]
pub struct DefaultToolContext {
    function_call_id: String,
    invocation_id: String,
}

impl DefaultToolContext {
    pub fn new(function_call_id: String, invocation_id: String) -> Self {
        Self {
            function_call_id,
            invocation_id,
        }
    }

    /// Context with freshly generated ids, for callers outside an agent run
    pub fn generated() -> Self {
        Self::new(
            format!("call-{}", uuid::Uuid::new_v4()),
            format!("inv-{}", uuid::Uuid::new_v4()),
        )
    }
}

impl ToolContext for DefaultToolContext {
    fn function_call_id(&self) -> &str {
        &self.function_call_id
    }

    fn invocation_id(&self) -> &str {
        &self.invocation_id
    }
}

/// Generates the JSON schema of a parameter type
pub fn generate_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    serde_json::to_value(schema).unwrap_or(Value::Null)
}
