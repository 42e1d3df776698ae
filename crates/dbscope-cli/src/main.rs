use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dbscope_analysis::{AnalysisDepth, AnalysisPayload, AnalyzeDatabaseRequest, DatabaseAnalyzer};
use dbscope_core::DbscopeConfig;
use std::path::PathBuf;
use std::process::ExitCode;

/// dbscope: read-only analysis of SQLite database files
#[derive(Parser, Debug)]
#[command(name = "dbscope", version, about)]
struct Cli {
    /// Database file to analyze
    path: PathBuf,

    /// analyze, structure, content, health, errors, report or suggest_fixes
    #[arg(long, short, default_value = "analyze")]
    operation: String,

    /// How much work the analysis may spend
    #[arg(long, value_enum, default_value_t = Depth::Comprehensive)]
    depth: Depth,

    /// Table to sample for the content operation
    #[arg(long)]
    table: Option<String>,

    /// Sample rows per table
    #[arg(long)]
    limit: Option<i64>,

    /// Leave sample rows out of analyze and report
    #[arg(long)]
    no_samples: bool,

    /// Skip error detection in analyze
    #[arg(long)]
    no_errors: bool,

    /// Leave corrective SQL out of the results
    #[arg(long)]
    no_fixes: bool,

    /// Path to dbscope.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the Markdown report instead of JSON
    #[arg(long)]
    markdown: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Depth {
    Quick,
    Standard,
    Comprehensive,
}

impl From<Depth> for AnalysisDepth {
    fn from(depth: Depth) -> Self {
        match depth {
            Depth::Quick => AnalysisDepth::Quick,
            Depth::Standard => AnalysisDepth::Standard,
            Depth::Comprehensive => AnalysisDepth::Comprehensive,
        }
    }
}

impl Cli {
    fn request(&self) -> AnalyzeDatabaseRequest {
        let operation = if self.markdown { "report" } else { self.operation.as_str() };

        let mut request = AnalyzeDatabaseRequest::new(self.path.display().to_string())
            .with_operation(operation)
            .with_depth(self.depth.into());
        request.include_sample_data = !self.no_samples;
        request.detect_errors = !self.no_errors;
        request.suggest_fixes = !self.no_fixes;
        request.table_name = self.table.clone();
        request.limit = self.limit;
        request
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = DbscopeConfig::load_from(cli.config.as_deref())?;
    dbscope_telemetry::init_telemetry(&config.observability)?;

    let analyzer = DatabaseAnalyzer::from_config(config);
    let result = analyzer.analyze(&cli.request()).await;

    match (&result.payload, cli.markdown) {
        (AnalysisPayload::Report { report }, true) => println!("{}", report),
        _ => {
            let output = serde_json::to_string_pretty(&result.to_json())
                .context("Failed to render analysis result")?;
            println!("{}", output);
        }
    }

    if result.success {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(error = result.error().unwrap_or_default(), "Analysis failed");
        Ok(ExitCode::FAILURE)
    }
}
