//! dbscope workspace
//!
//! Read-only analysis of SQLite database files: schema discovery, content
//! profiling, integrity and corruption checks, health scoring and Markdown
//! reports, exposed to agents as the `db_analysis` tool.

pub use dbscope_analysis;
pub use dbscope_core;
pub use dbscope_telemetry;
