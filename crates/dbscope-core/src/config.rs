//! Configuration management for dbscope
//!
//! Loads configuration with priority:
//! 1. Explicitly specified config file
//! 2. dbscope.toml in the current directory or one of its parents
//! 3. Defaults
//!
//! String values of the form `${VAR_NAME}` are resolved from the environment.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for when no path is given
pub const CONFIG_FILE_NAME: &str = "dbscope.toml";

/// dbscope configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbscopeConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub scoring: ScoringPolicy,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Limits applied while reading a database file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Sample rows returned when the caller does not pass a limit
    #[serde(default = "default_sample_limit")]
    pub default_sample_limit: u32,

    /// Upper bound requested sample sizes are clamped to
    #[serde(default = "default_max_sample_limit")]
    pub max_sample_limit: u32,

    /// How long an open waits on a lock held by another process
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of problems `integrity_check` reports before stopping
    #[serde(default = "default_integrity_max_errors")]
    pub integrity_max_errors: u32,

    /// Distinct values tracked per column while profiling a table
    #[serde(default = "default_max_distinct_values")]
    pub max_distinct_values: usize,
}

/// Constants of the health score.
///
/// Every penalty is subtracted from a sub-score of 100 and the result is
/// clamped to `[0, 100]`, so any non-negative policy keeps scores bounded and
/// monotonic in the number of findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Points removed per integrity-check error
    #[serde(default = "default_integrity_error_penalty")]
    pub integrity_error_penalty: f64,

    /// Points removed when corruption is detected
    #[serde(default = "default_corruption_penalty")]
    pub corruption_penalty: f64,

    /// Points removed per low-severity logical finding
    #[serde(default = "default_low_penalty")]
    pub low_penalty: f64,

    /// Points removed per medium-severity logical finding
    #[serde(default = "default_medium_penalty")]
    pub medium_penalty: f64,

    /// Points removed per high or critical logical finding
    #[serde(default = "default_high_penalty")]
    pub high_penalty: f64,

    /// Table count above which the first performance penalty applies
    #[serde(default = "default_table_count_warning")]
    pub table_count_warning: u64,

    /// Table count above which the second performance penalty applies
    #[serde(default = "default_table_count_critical")]
    pub table_count_critical: u64,

    /// Points removed for each table-count threshold exceeded
    #[serde(default = "default_table_count_penalty")]
    pub table_count_penalty: f64,

    /// Performance score reported when the file cannot be inspected
    #[serde(default = "default_performance_fallback_score")]
    pub performance_fallback_score: f64,
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Filter directive used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit log lines as JSON objects
    #[serde(default)]
    pub json: bool,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_sample_limit: default_sample_limit(),
            max_sample_limit: default_max_sample_limit(),
            busy_timeout_ms: default_busy_timeout_ms(),
            integrity_max_errors: default_integrity_max_errors(),
            max_distinct_values: default_max_distinct_values(),
        }
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            integrity_error_penalty: default_integrity_error_penalty(),
            corruption_penalty: default_corruption_penalty(),
            low_penalty: default_low_penalty(),
            medium_penalty: default_medium_penalty(),
            high_penalty: default_high_penalty(),
            table_count_warning: default_table_count_warning(),
            table_count_critical: default_table_count_critical(),
            table_count_penalty: default_table_count_penalty(),
            performance_fallback_score: default_performance_fallback_score(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            json: false,
            service_name: default_service_name(),
        }
    }
}

impl DbscopeConfig {
    /// Load configuration from dbscope.toml if one can be found, else defaults
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file, or search for one when `None`
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::find_config_file()? {
                Some(found) => found,
                None => {
                    tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                    return Ok(Self::default());
                }
            },
        };

        tracing::debug!("Loading configuration from: {:?}", config_path);

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))
    }

    /// Parse, resolve and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: DbscopeConfig = toml::from_str(contents)?;
        config.resolve_env_vars();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break score bounds or sampling
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if analysis.max_sample_limit == 0 {
            return Err(anyhow!("analysis.max_sample_limit must be at least 1"));
        }
        if analysis.default_sample_limit == 0
            || analysis.default_sample_limit > analysis.max_sample_limit
        {
            return Err(anyhow!(
                "analysis.default_sample_limit must be between 1 and max_sample_limit ({})",
                analysis.max_sample_limit
            ));
        }

        let scoring = &self.scoring;
        let penalties = [
            ("integrity_error_penalty", scoring.integrity_error_penalty),
            ("corruption_penalty", scoring.corruption_penalty),
            ("low_penalty", scoring.low_penalty),
            ("medium_penalty", scoring.medium_penalty),
            ("high_penalty", scoring.high_penalty),
            ("table_count_penalty", scoring.table_count_penalty),
        ];
        for (name, value) in penalties {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("scoring.{} must be a non-negative number", name));
            }
        }
        if !(0.0..=100.0).contains(&scoring.performance_fallback_score) {
            return Err(anyhow!(
                "scoring.performance_fallback_score must be within 0..=100"
            ));
        }
        if scoring.table_count_critical < scoring.table_count_warning {
            return Err(anyhow!(
                "scoring.table_count_critical must not be below table_count_warning"
            ));
        }

        Ok(())
    }

    /// Find dbscope.toml by searching current directory and parents
    fn find_config_file() -> Result<Option<PathBuf>> {
        let mut current = env::current_dir()?;

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if !current.pop() {
                return Ok(None);
            }
        }
    }

    /// Resolve ${VAR_NAME} references to environment variables
    fn resolve_env_vars(&mut self) {
        if let Some(resolved) = Self::resolve_env_var(&self.observability.log_filter) {
            self.observability.log_filter = resolved;
        } else {
            self.observability.log_filter = default_log_filter();
        }

        if let Some(resolved) = Self::resolve_env_var(&self.observability.service_name) {
            self.observability.service_name = resolved;
        } else {
            self.observability.service_name = default_service_name();
        }
    }

    /// Resolve a single ${VAR_NAME} reference
    fn resolve_env_var(value: &str) -> Option<String> {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            env::var(var_name).ok()
        } else {
            Some(value.to_string())
        }
    }
}

fn default_sample_limit() -> u32 {
    10
}

fn default_max_sample_limit() -> u32 {
    100
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_integrity_max_errors() -> u32 {
    100
}

fn default_max_distinct_values() -> usize {
    10_000
}

fn default_integrity_error_penalty() -> f64 {
    20.0
}

fn default_corruption_penalty() -> f64 {
    100.0
}

fn default_low_penalty() -> f64 {
    5.0
}

fn default_medium_penalty() -> f64 {
    10.0
}

fn default_high_penalty() -> f64 {
    20.0
}

fn default_table_count_warning() -> u64 {
    10
}

fn default_table_count_critical() -> u64 {
    50
}

fn default_table_count_penalty() -> f64 {
    10.0
}

fn default_performance_fallback_score() -> f64 {
    50.0
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "dbscope".to_string()
}
