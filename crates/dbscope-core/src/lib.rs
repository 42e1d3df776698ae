//! Core traits and types for dbscope
//!
//! This crate provides the pieces shared by every other crate in the
//! workspace: the error type, the tool abstraction analysis is exposed
//! through, and configuration loading.

pub mod config;
pub mod error;
pub mod tool;

// Re-exports
pub use config::{AnalysisConfig, DbscopeConfig, ObservabilityConfig, ScoringPolicy};
pub use error::{Error, Result};
pub use tool::{DefaultToolContext, Tool, ToolContext, ToolResponse, generate_schema};
