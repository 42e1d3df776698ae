//! Schema and file metadata extraction

use crate::error::Result;
use crate::header::FileHeader;
use crate::sqlite;
use crate::types::{DatabaseInfo, DatabaseType, SchemaDocument, SchemaSummary, TableDescriptor};
use dbscope_core::AnalysisConfig;
use sqlx::sqlite::SqliteConnection;
use std::collections::HashMap;
use std::path::Path;

/// Reads the schema of a database file through introspection pragmas.
///
/// Every call opens its own read-only connection and closes it before
/// returning; nothing is cached between calls.
#[derive(Debug, Clone, Default)]
pub struct StructureAnalyzer {
    config: AnalysisConfig,
}

impl StructureAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Recognise the database format from the file signature
    pub async fn detect_database_type(&self, path: &Path) -> Result<DatabaseType> {
        Ok(sqlite::inspect(path).await?.db_type)
    }

    /// Build the schema document for a SQLite file.
    ///
    /// Fails only when the file cannot be opened or its schema table cannot be
    /// read. Per-table reads that fail degrade to empty values and are listed
    /// in the table's `warnings`.
    pub async fn analyze_schema(&self, path: &Path) -> Result<SchemaDocument> {
        tracing::debug!(path = %path.display(), "Analyzing schema");

        let mut conn = sqlite::open_read_only(path, &self.config).await?;
        let result = read_schema(&mut conn).await;
        sqlite::close_quietly(conn).await;

        let schema = result.map_err(|e| e.locked_at(path))?;
        tracing::debug!(
            path = %path.display(),
            tables = schema.summary.table_count,
            total_rows = schema.summary.total_rows,
            "Schema analyzed"
        );
        Ok(schema)
    }

    /// File metadata; engine-reported fields are left empty when unreadable
    pub async fn get_database_info(&self, path: &Path) -> Result<DatabaseInfo> {
        let inspected = sqlite::inspect(path).await?;

        let mut info = DatabaseInfo {
            database_type: inspected.db_type,
            file_path: path.display().to_string(),
            file_size: inspected.len,
            page_count: None,
            page_size: None,
            freelist_count: None,
            encoding: None,
            journal_mode: None,
            sqlite_version: None,
        };

        if inspected.db_type != DatabaseType::Sqlite {
            return Ok(info);
        }

        if let Some(header) = FileHeader::parse(&inspected.prefix) {
            info.page_size = Some(i64::from(header.page_size()));
            info.encoding = header.encoding_name().map(str::to_string);
        }

        match sqlite::connect(path, &self.config).await {
            Ok(mut conn) => {
                read_engine_info(&mut conn, &mut info).await;
                sqlite::close_quietly(conn).await;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Engine metadata unavailable");
            }
        }

        Ok(info)
    }
}

async fn read_schema(conn: &mut SqliteConnection) -> Result<SchemaDocument> {
    let tables = sqlite::list_tables(conn).await?;

    // dbstat is optional in the engine build; a missing size is not a finding
    let sizes = match sqlite::btree_sizes(conn).await {
        Ok(sizes) => sizes,
        Err(e) => {
            tracing::debug!(error = %e, "Table sizes unavailable");
            HashMap::new()
        }
    };

    let mut descriptors = Vec::with_capacity(tables.len());
    for (name, sql) in tables {
        let size_bytes = sizes.get(&name).copied().unwrap_or(0);
        descriptors.push(describe_table(conn, name, sql, size_bytes).await);
    }

    let views = sqlite::list_definitions(conn, "view").await?;
    let triggers = sqlite::list_definitions(conn, "trigger").await?;

    let summary = SchemaSummary {
        table_count: descriptors.len(),
        view_count: views.len(),
        trigger_count: triggers.len(),
        index_count: descriptors.iter().map(|t| t.indexes.len()).sum(),
        total_rows: descriptors.iter().map(|t| t.row_count).sum(),
    };

    Ok(SchemaDocument {
        database_type: DatabaseType::Sqlite,
        tables: descriptors,
        views,
        triggers,
        summary,
    })
}

async fn describe_table(
    conn: &mut SqliteConnection,
    name: String,
    sql: Option<String>,
    size_bytes: u64,
) -> TableDescriptor {
    let mut warnings = Vec::new();

    let columns = or_warn(sqlite::columns(conn, &name).await, &name, &mut warnings);
    let primary_key = or_warn(sqlite::primary_key(conn, &name).await, &name, &mut warnings);
    let indexes = or_warn(sqlite::indexes(conn, &name).await, &name, &mut warnings);
    let foreign_keys = or_warn(sqlite::foreign_keys(conn, &name).await, &name, &mut warnings);
    let row_count = or_warn(sqlite::count_rows(conn, &name).await, &name, &mut warnings);

    TableDescriptor {
        name,
        sql,
        columns,
        primary_key,
        row_count,
        size_bytes,
        indexes,
        foreign_keys,
        warnings,
    }
}

fn or_warn<T: Default>(result: Result<T>, table: &str, warnings: &mut Vec<String>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(table = %table, error = %e, "Degraded table read");
            warnings.push(e.to_string());
            T::default()
        }
    }
}

async fn read_engine_info(conn: &mut SqliteConnection, info: &mut DatabaseInfo) {
    if let Ok(page_count) = sqlite::pragma_i64(conn, "page_count").await {
        info.page_count = Some(page_count);
    }
    if let Ok(page_size) = sqlite::pragma_i64(conn, "page_size").await {
        info.page_size = Some(page_size);
    }
    if let Ok(freelist) = sqlite::pragma_i64(conn, "freelist_count").await {
        info.freelist_count = Some(freelist);
    }
    if let Ok(encoding) = sqlite::pragma_text(conn, "encoding").await {
        info.encoding = Some(encoding);
    }
    if let Ok(journal_mode) = sqlite::pragma_text(conn, "journal_mode").await {
        info.journal_mode = Some(journal_mode);
    }
    info.sqlite_version = sqlx::query_scalar("SELECT sqlite_version()")
        .fetch_one(&mut *conn)
        .await
        .ok();
}
