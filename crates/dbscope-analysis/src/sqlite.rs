//! Read-only access to SQLite files and schema introspection helpers

use crate::error::{AnalysisError, Result};
use crate::header::{SNIFF_LEN, sniff_database_type};
use crate::types::{ColumnDescriptor, DatabaseType, ForeignKeyDescriptor, IndexDescriptor, NamedDefinition};
use dbscope_core::AnalysisConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;

type SqlxResult<T> = std::result::Result<T, sqlx::Error>;

/// What is known about a file before the engine touches it
#[derive(Debug, Clone)]
pub(crate) struct InspectedFile {
    pub len: u64,
    pub db_type: DatabaseType,
    pub prefix: Vec<u8>,
}

/// Check that `path` is a regular file and recognise its format
pub(crate) async fn inspect(path: &Path) -> Result<InspectedFile> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AnalysisError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    if !metadata.is_file() {
        return Err(AnalysisError::NotAFile(path.to_path_buf()));
    }

    let file = tokio::fs::File::open(path).await?;
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut prefix).await?;

    let db_type = sniff_database_type(&prefix)
        .ok_or_else(|| AnalysisError::UnknownFormat(path.to_path_buf()))?;

    Ok(InspectedFile {
        len: metadata.len(),
        db_type,
        prefix,
    })
}

/// Inspect `path` and reject formats other than SQLite
pub(crate) async fn ensure_sqlite(path: &Path) -> Result<InspectedFile> {
    let inspected = inspect(path).await?;
    if inspected.db_type != DatabaseType::Sqlite {
        return Err(AnalysisError::Unsupported {
            path: path.to_path_buf(),
            db_type: inspected.db_type,
        });
    }
    Ok(inspected)
}

/// Open a SQLite file without write access.
///
/// The connection is opened `SQLITE_OPEN_READONLY` with `query_only` set, so
/// neither the file nor its journal can be modified through it.
pub(crate) async fn open_read_only(path: &Path, config: &AnalysisConfig) -> Result<SqliteConnection> {
    ensure_sqlite(path).await?;
    connect(path, config).await
}

/// Connect without re-inspecting, for callers that already checked the file
pub(crate) async fn connect(path: &Path, config: &AnalysisConfig) -> Result<SqliteConnection> {
    SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .pragma("query_only", "ON")
        .connect()
        .await
        .map_err(|source| {
            AnalysisError::Open {
                path: path.to_path_buf(),
                source,
            }
            .locked_at(path)
        })
}

pub(crate) async fn close_quietly(conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Failed to close SQLite connection cleanly");
    }
}

/// Path of the write-ahead log that would accompany `path`
pub(crate) fn wal_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("-wal");
    PathBuf::from(name)
}

/// Quote an identifier for interpolation into SQL text
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for interpolation into SQL text
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Base tables in schema order with their DDL
pub(crate) async fn list_tables(conn: &mut SqliteConnection) -> Result<Vec<(String, Option<String>)>> {
    let rows = sqlx::query(
        r#"
            SELECT name, sql
            FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AnalysisError::query("list tables", e))?;

    rows.iter()
        .map(|row| -> SqlxResult<(String, Option<String>)> {
            Ok((row.try_get("name")?, row.try_get("sql")?))
        })
        .collect::<SqlxResult<_>>()
        .map_err(|e| AnalysisError::query("list tables", e))
}

/// Views or triggers in schema order
pub(crate) async fn list_definitions(
    conn: &mut SqliteConnection,
    kind: &str,
) -> Result<Vec<NamedDefinition>> {
    let context = format!("list {}s", kind);
    let rows = sqlx::query("SELECT name, sql FROM sqlite_master WHERE type = ?1")
        .bind(kind)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AnalysisError::query(context.clone(), e))?;

    rows.iter()
        .map(|row| -> SqlxResult<NamedDefinition> {
            Ok(NamedDefinition {
                name: row.try_get("name")?,
                definition: row.try_get("sql")?,
            })
        })
        .collect::<SqlxResult<_>>()
        .map_err(|e| AnalysisError::query(context, e))
}

pub(crate) async fn count_rows(conn: &mut SqliteConnection, table: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
    let count: i64 = sqlx::query_scalar(&sql)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AnalysisError::query(format!("count rows of {}", table), e))?;
    Ok(count.max(0) as u64)
}

/// Bytes used by each b-tree according to `dbstat`, in one pass over the file
pub(crate) async fn btree_sizes(conn: &mut SqliteConnection) -> Result<HashMap<String, u64>> {
    let rows = sqlx::query("SELECT name, SUM(pgsize) AS size FROM dbstat GROUP BY name")
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AnalysisError::query("measure tables", e))?;

    rows.iter()
        .map(|row| -> SqlxResult<(String, u64)> {
            let size: Option<i64> = row.try_get("size")?;
            Ok((row.try_get("name")?, size.unwrap_or(0).max(0) as u64))
        })
        .collect::<SqlxResult<_>>()
        .map_err(|e| AnalysisError::query("measure tables", e))
}

pub(crate) async fn columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<ColumnDescriptor>> {
    let context = format!("columns of {}", table);
    let rows = sqlx::query(
        r#"
            SELECT cid, name, "type", "notnull", dflt_value, pk
            FROM pragma_table_info(?1)
            ORDER BY cid
        "#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AnalysisError::query(context.clone(), e))?;

    rows.iter()
        .map(|row| -> SqlxResult<ColumnDescriptor> {
            let not_null = row.try_get::<i64, _>("notnull")? != 0;
            Ok(ColumnDescriptor {
                name: row.try_get("name")?,
                data_type: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                not_null,
                nullable: !not_null,
                default: row.try_get("dflt_value")?,
                primary_key: row.try_get::<i64, _>("pk")? > 0,
                position: row.try_get::<i64, _>("cid")?.max(0) as u32,
            })
        })
        .collect::<SqlxResult<_>>()
        .map_err(|e| AnalysisError::query(context, e))
}

/// Primary key column names in key order
pub(crate) async fn primary_key(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AnalysisError::query(format!("primary key of {}", table), e))
}

pub(crate) async fn indexes(conn: &mut SqliteConnection, table: &str) -> Result<Vec<IndexDescriptor>> {
    let context = format!("indexes of {}", table);
    let rows = sqlx::query(r#"SELECT name, "unique", origin, partial FROM pragma_index_list(?1)"#)
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AnalysisError::query(context.clone(), e))?;

    let mut indexes = Vec::with_capacity(rows.len());
    for row in &rows {
        let (name, unique, origin, partial) =
            index_flags(row).map_err(|e| AnalysisError::query(context.clone(), e))?;

        // Expression index members have no column name
        let columns: Vec<Option<String>> =
            sqlx::query_scalar("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")
                .bind(&name)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| AnalysisError::query(context.clone(), e))?;

        indexes.push(IndexDescriptor {
            name,
            columns: columns
                .into_iter()
                .map(|column| column.unwrap_or_else(|| "<expression>".to_string()))
                .collect(),
            unique,
            origin,
            partial,
        });
    }

    Ok(indexes)
}

fn index_flags(row: &SqliteRow) -> SqlxResult<(String, bool, String, bool)> {
    Ok((
        row.try_get("name")?,
        row.try_get::<i64, _>("unique")? != 0,
        row.try_get("origin")?,
        row.try_get::<i64, _>("partial")? != 0,
    ))
}

pub(crate) async fn foreign_keys(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<ForeignKeyDescriptor>> {
    let context = format!("foreign keys of {}", table);
    let rows = sqlx::query(
        r#"
            SELECT id, seq, "table", "from", "to", on_update, on_delete
            FROM pragma_foreign_key_list(?1)
            ORDER BY id, seq
        "#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AnalysisError::query(context.clone(), e))?;

    rows.iter()
        .map(|row| -> SqlxResult<ForeignKeyDescriptor> {
            Ok(ForeignKeyDescriptor {
                id: row.try_get("id")?,
                column: row.try_get("from")?,
                references_table: row.try_get("table")?,
                references_column: row.try_get("to")?,
                on_update: row.try_get("on_update")?,
                on_delete: row.try_get("on_delete")?,
            })
        })
        .collect::<SqlxResult<_>>()
        .map_err(|e| AnalysisError::query(context, e))
}

/// Read a single-value pragma such as `page_size`
pub(crate) async fn pragma_i64(conn: &mut SqliteConnection, pragma: &str) -> Result<i64> {
    sqlx::query_scalar(&format!("PRAGMA {}", pragma))
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AnalysisError::query(format!("PRAGMA {}", pragma), e))
}

pub(crate) async fn pragma_text(conn: &mut SqliteConnection, pragma: &str) -> Result<String> {
    sqlx::query_scalar(&format!("PRAGMA {}", pragma))
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AnalysisError::query(format!("PRAGMA {}", pragma), e))
}
