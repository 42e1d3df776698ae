//! Row sampling and per-column profiling

use crate::error::{AnalysisError, Result};
use crate::sqlite::{self, quote_identifier};
use crate::types::{
    ColumnDistribution, ColumnPatterns, ColumnStatistics, ContentSample, InferredRelationship,
    StorageClassCounts, ValueFrequency,
};
use crate::value::{SqlValue, decode_row};
use dbscope_core::AnalysisConfig;
use futures::TryStreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Column, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const SAMPLE_VALUES: usize = 5;
const TOP_VALUES: usize = 5;
const UNIQUE_SAMPLE_VALUES: usize = 10;
const RELATIONSHIP_CONFIDENCE: f64 = 0.7;

struct ValuePattern {
    name: &'static str,
    regex: &'static Lazy<Regex>,
    text_only: bool,
}

macro_rules! pattern_regex {
    ($name:ident, $pattern:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new($pattern).expect("Hard-coded regex pattern should be valid")
        });
    };
}

pattern_regex!(EMAIL, r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$");
pattern_regex!(URL, r"(?i)^(https?|ftp)://[^\s/$.?#][^\s]*$");
pattern_regex!(
    UUID,
    r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"
);
pattern_regex!(
    ISO8601_DATE,
    r"^\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?$"
);
pattern_regex!(UNIX_TIMESTAMP, r"^\d{10}(?:\d{3})?$");
pattern_regex!(PHONE, r"^\+?[\d\s().-]{7,20}$");

/// Checked in order; a value counts toward the first pattern it matches
static PATTERNS: [ValuePattern; 6] = [
    ValuePattern { name: "email", regex: &EMAIL, text_only: true },
    ValuePattern { name: "url", regex: &URL, text_only: true },
    ValuePattern { name: "uuid", regex: &UUID, text_only: true },
    ValuePattern { name: "iso8601_date", regex: &ISO8601_DATE, text_only: true },
    ValuePattern { name: "unix_timestamp", regex: &UNIX_TIMESTAMP, text_only: false },
    ValuePattern { name: "phone", regex: &PHONE, text_only: true },
];

fn classify(value: &SqlValue) -> Option<&'static str> {
    let (text, is_text) = match value {
        SqlValue::Text(text) => (text.trim().to_string(), true),
        SqlValue::Integer(v) => (v.to_string(), false),
        _ => return None,
    };

    PATTERNS
        .iter()
        .filter(|pattern| is_text || !pattern.text_only)
        .find(|pattern| {
            pattern.regex.is_match(&text)
                && (pattern.name != "phone" || text.chars().filter(char::is_ascii_digit).count() >= 7)
        })
        .map(|pattern| pattern.name)
}

/// Patterns and distribution of one column over a full table scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub patterns: Option<ColumnPatterns>,
    pub distribution: ColumnDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProfile {
    pub table_name: String,
    pub rows_scanned: u64,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    /// Columns with at least one recognised pattern
    pub fn patterns(&self) -> BTreeMap<String, ColumnPatterns> {
        self.columns
            .iter()
            .filter_map(|c| c.patterns.clone().map(|p| (c.name.clone(), p)))
            .collect()
    }

    pub fn distributions(&self) -> BTreeMap<String, ColumnDistribution> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.distribution.clone()))
            .collect()
    }
}

/// Samples rows and profiles column contents.
///
/// Samples take the first rows in the engine's natural order; nothing is
/// randomised, so repeated calls on an unchanged file agree.
#[derive(Debug, Clone, Default)]
pub struct ContentAnalyzer {
    config: AnalysisConfig,
}

impl ContentAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// First `limit` rows of `table_name` with statistics over them.
    ///
    /// A `limit` of zero or less yields no rows. Fails with `TableNotFound`
    /// when the table does not exist.
    pub async fn sample_content(&self, path: &Path, table_name: &str, limit: i64) -> Result<ContentSample> {
        tracing::debug!(path = %path.display(), table = %table_name, limit, "Sampling content");

        let mut conn = sqlite::open_read_only(path, &self.config).await?;
        let result = sample(&mut conn, table_name, limit).await;
        sqlite::close_quietly(conn).await;
        result.map_err(|e| e.locked_at(path))
    }

    /// Scan the whole table once, collecting patterns and distributions
    pub async fn profile_table(&self, path: &Path, table_name: &str) -> Result<TableProfile> {
        tracing::debug!(path = %path.display(), table = %table_name, "Profiling table");

        let mut conn = sqlite::open_read_only(path, &self.config).await?;
        let result = profile(&mut conn, table_name, self.config.max_distinct_values).await;
        sqlite::close_quietly(conn).await;
        result.map_err(|e| e.locked_at(path))
    }

    pub async fn detect_patterns(&self, path: &Path, table_name: &str) -> Result<BTreeMap<String, ColumnPatterns>> {
        Ok(self.profile_table(path, table_name).await?.patterns())
    }

    pub async fn analyze_distributions(
        &self,
        path: &Path,
        table_name: &str,
    ) -> Result<BTreeMap<String, ColumnDistribution>> {
        Ok(self.profile_table(path, table_name).await?.distributions())
    }

    /// Guess undeclared foreign keys from `<table>_id` style column names
    pub async fn infer_relationships(&self, path: &Path) -> Result<Vec<InferredRelationship>> {
        let mut conn = sqlite::open_read_only(path, &self.config).await?;
        let result = infer(&mut conn).await;
        sqlite::close_quietly(conn).await;
        result.map_err(|e| e.locked_at(path))
    }
}

/// Canonical name of a table or view, matched case-insensitively
async fn resolve_table(conn: &mut SqliteConnection, table_name: &str) -> Result<String> {
    let name: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE",
    )
    .bind(table_name)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AnalysisError::query(format!("resolve table {}", table_name), e))?;

    name.ok_or_else(|| AnalysisError::TableNotFound(table_name.to_string()))
}

async fn sample(conn: &mut SqliteConnection, table_name: &str, limit: i64) -> Result<ContentSample> {
    let table = resolve_table(conn, table_name).await?;
    let row_count = sqlite::count_rows(conn, &table).await?;

    let mut content = ContentSample::empty(table.clone());
    content.row_count = row_count;
    if limit <= 0 {
        return Ok(content);
    }

    let context = format!("sample {}", table);
    let sql = format!("SELECT * FROM {} LIMIT ?1", quote_identifier(&table));
    let rows = sqlx::query(&sql)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AnalysisError::query(context.clone(), e))?;

    let Some(first) = rows.first() else {
        return Ok(content);
    };
    let names: Vec<String> = first.columns().iter().map(|c| c.name().to_string()).collect();

    let mut decoded = Vec::with_capacity(rows.len());
    for row in &rows {
        decoded.push(decode_row(row).map_err(|e| AnalysisError::query(context.clone(), e))?);
    }

    content.sample_rows = decoded
        .iter()
        .map(|values| {
            names
                .iter()
                .cloned()
                .zip(values.iter().map(SqlValue::to_json))
                .collect::<Map<_, _>>()
        })
        .collect();

    content.column_statistics = names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let column = decoded.iter().map(|values| &values[index]);
            (name.clone(), sample_statistics(column))
        })
        .collect();

    Ok(content)
}

fn sample_statistics<'a>(values: impl Iterator<Item = &'a SqlValue>) -> ColumnStatistics {
    let mut null_count = 0;
    let mut non_null_count = 0;
    let mut seen = BTreeSet::new();
    let mut sample_values = Vec::new();

    for value in values {
        match value.render() {
            None => null_count += 1,
            Some(text) => {
                non_null_count += 1;
                if seen.insert(text.clone()) && sample_values.len() < SAMPLE_VALUES {
                    sample_values.push(text);
                }
            }
        }
    }

    ColumnStatistics {
        null_count,
        non_null_count,
        unique_values: seen.len() as u64,
        sample_values,
    }
}

#[derive(Default)]
struct ColumnAccumulator {
    null_count: u64,
    non_null_count: u64,
    storage_classes: StorageClassCounts,
    distinct: BTreeMap<String, u64>,
    distinct_capped: bool,
    numeric_count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern_counts: BTreeMap<&'static str, u64>,
    pattern_samples: Vec<String>,
}

impl ColumnAccumulator {
    fn observe(&mut self, value: &SqlValue, max_distinct: usize) {
        let Some(text) = value.render() else {
            self.null_count += 1;
            return;
        };
        self.non_null_count += 1;

        match value {
            SqlValue::Integer(_) => self.storage_classes.integer += 1,
            SqlValue::Real(_) => self.storage_classes.real += 1,
            SqlValue::Text(s) => {
                self.storage_classes.text += 1;
                let length = s.chars().count();
                self.min_length = Some(self.min_length.map_or(length, |m| m.min(length)));
                self.max_length = Some(self.max_length.map_or(length, |m| m.max(length)));
            }
            SqlValue::Blob(_) => self.storage_classes.blob += 1,
            SqlValue::Null => {}
        }

        if let Some(number) = value.as_f64() {
            self.numeric_count += 1;
            self.sum += number;
            self.min = Some(self.min.map_or(number, |m| m.min(number)));
            self.max = Some(self.max.map_or(number, |m| m.max(number)));
        }

        if let Some(pattern) = classify(value) {
            *self.pattern_counts.entry(pattern).or_default() += 1;
            if self.pattern_samples.len() < SAMPLE_VALUES && !self.pattern_samples.contains(&text) {
                self.pattern_samples.push(text.clone());
            }
        }

        if let Some(count) = self.distinct.get_mut(&text) {
            *count += 1;
        } else if self.distinct.len() < max_distinct {
            self.distinct.insert(text, 1);
        } else {
            self.distinct_capped = true;
        }
    }

    fn finish(self, name: String) -> ColumnProfile {
        let patterns = self.patterns();

        let mut top_values: Vec<ValueFrequency> = self
            .distinct
            .iter()
            .map(|(value, count)| ValueFrequency {
                value: value.clone(),
                count: *count,
            })
            .collect();
        top_values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        top_values.truncate(TOP_VALUES);

        let unique_value_count = self.distinct.len() as u64;
        let distribution = ColumnDistribution {
            unique_value_count,
            distinct_capped: self.distinct_capped,
            null_count: self.null_count,
            non_null_count: self.non_null_count,
            unique_ratio: ratio(unique_value_count, self.non_null_count),
            storage_classes: self.storage_classes,
            min: self.min,
            max: self.max,
            mean: (self.numeric_count > 0).then(|| round4(self.sum / self.numeric_count as f64)),
            min_length: self.min_length,
            max_length: self.max_length,
            top_values,
            sample_unique_values: self.distinct.into_keys().take(UNIQUE_SAMPLE_VALUES).collect(),
        };

        ColumnProfile {
            name,
            patterns,
            distribution,
        }
    }

    fn patterns(&self) -> Option<ColumnPatterns> {
        if self.pattern_counts.is_empty() {
            return None;
        }

        let mut ranked: Vec<(&'static str, u64)> =
            self.pattern_counts.iter().map(|(name, count)| (*name, *count)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        Some(ColumnPatterns {
            detected_patterns: ranked.iter().map(|(name, _)| name.to_string()).collect(),
            match_counts: ranked.iter().map(|(name, count)| (name.to_string(), *count)).collect(),
            confidence: ratio(ranked[0].1, self.non_null_count),
            sample_values: self.pattern_samples.clone(),
        })
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round4(part as f64 / whole as f64)
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

async fn profile(conn: &mut SqliteConnection, table_name: &str, max_distinct: usize) -> Result<TableProfile> {
    let table = resolve_table(conn, table_name).await?;
    let columns = sqlite::columns(conn, &table).await?;

    let mut accumulators: Vec<ColumnAccumulator> =
        columns.iter().map(|_| ColumnAccumulator::default()).collect();
    let mut rows_scanned = 0u64;

    if !columns.is_empty() {
        let context = format!("profile {}", table);
        let select_list = columns
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM {}", select_list, quote_identifier(&table));

        let mut rows = sqlx::query(&sql).fetch(&mut *conn);
        while let Some(row) = rows
            .try_next()
            .await
            .map_err(|e| AnalysisError::query(context.clone(), e))?
        {
            let values = decode_row(&row).map_err(|e| AnalysisError::query(context.clone(), e))?;
            for (accumulator, value) in accumulators.iter_mut().zip(&values) {
                accumulator.observe(value, max_distinct);
            }
            rows_scanned += 1;
        }
    }

    tracing::debug!(table = %table, rows_scanned, "Profiled table");

    Ok(TableProfile {
        table_name: table,
        rows_scanned,
        columns: columns
            .into_iter()
            .zip(accumulators)
            .map(|(column, accumulator)| accumulator.finish(column.name))
            .collect(),
    })
}

/// Table names a column stem could refer to: `author` → author, authors
fn stem_candidates(stem: &str) -> Vec<String> {
    let mut candidates = vec![stem.to_string(), format!("{}s", stem), format!("{}es", stem)];
    if let Some(base) = stem.strip_suffix('y') {
        candidates.push(format!("{}ies", base));
    }
    candidates
}

fn column_stem(column: &str) -> Option<String> {
    let lower = column.to_ascii_lowercase();
    let stem = lower
        .strip_suffix("_id")
        .or_else(|| lower.strip_suffix("id"))?
        .trim_end_matches('_');
    (!stem.is_empty()).then(|| stem.to_string())
}

async fn infer(conn: &mut SqliteConnection) -> Result<Vec<InferredRelationship>> {
    let tables = sqlite::list_tables(conn).await?;

    let mut described = Vec::with_capacity(tables.len());
    for (name, _) in &tables {
        let columns = sqlite::columns(conn, name).await.unwrap_or_default();
        let declared = sqlite::foreign_keys(conn, name).await.unwrap_or_default();
        described.push((name.clone(), columns, declared));
    }

    let mut relationships = Vec::new();
    for (table, columns, declared) in &described {
        for column in columns {
            if column.primary_key || declared.iter().any(|fk| fk.column.eq_ignore_ascii_case(&column.name)) {
                continue;
            }
            let Some(stem) = column_stem(&column.name) else {
                continue;
            };

            let candidates = stem_candidates(&stem);
            let target = described.iter().find(|(name, _, _)| {
                candidates.iter().any(|candidate| name.eq_ignore_ascii_case(candidate))
            });
            let Some((target_name, target_columns, _)) = target else {
                continue;
            };

            let keys: Vec<&str> = target_columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| c.name.as_str())
                .collect();
            let to_column = match keys.as_slice() {
                [key] => key.to_string(),
                _ if target_columns.iter().any(|c| c.name.eq_ignore_ascii_case("id")) => "id".to_string(),
                _ => continue,
            };

            relationships.push(InferredRelationship {
                from_table: table.clone(),
                from_column: column.name.clone(),
                to_table: target_name.clone(),
                to_column,
                relationship_type: "potential_foreign_key".to_string(),
                confidence: RELATIONSHIP_CONFIDENCE,
            });
        }
    }

    Ok(relationships)
}
