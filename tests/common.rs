//! Fixture databases shared by the integration tests

#![allow(dead_code)]

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Route library logs to the test harness; `RUST_LOG` picks the level
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A database file inside its own temporary directory
pub struct Fixture {
    dir: TempDir,
    path: PathBuf,
}

impl Fixture {
    pub async fn create(name: &str, statements: &[&str]) -> anyhow::Result<Self> {
        init_logging();
        let dir = TempDir::new()?;
        let path = dir.path().join(name);
        let fixture = Self { dir, path };
        fixture.execute(statements).await?;
        tracing::debug!(path = %fixture.path.display(), statements = statements.len(), "Fixture created");
        Ok(fixture)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_string(&self) -> String {
        self.path.display().to_string()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Writable connection with foreign key enforcement off
    pub async fn writer(&self) -> anyhow::Result<SqliteConnection> {
        let conn = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .foreign_keys(false)
            .connect()
            .await?;
        Ok(conn)
    }

    pub async fn execute(&self, statements: &[&str]) -> anyhow::Result<()> {
        let mut conn = self.writer().await?;
        for statement in statements {
            sqlx::query(statement).execute(&mut conn).await?;
        }
        conn.close().await?;
        Ok(())
    }

    pub fn bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(std::fs::read(&self.path)?)
    }

    pub fn truncate_to(&self, len: u64) -> anyhow::Result<()> {
        let file = std::fs::OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len)?;
        Ok(())
    }
}

pub const BOOKSHOP_SCHEMA: &[&str] = &[
    "CREATE TABLE books (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        author_id INTEGER REFERENCES authors(id),
        isbn TEXT
    )",
    "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL, homepage TEXT)",
    "CREATE INDEX idx_books_author ON books(author_id)",
    "INSERT INTO authors (id, name, homepage) VALUES
        (1, 'Octavia E. Butler', 'https://octaviabutler.org'),
        (2, 'Italo Calvino', NULL)",
    "INSERT INTO books (id, title, author_id, isbn) VALUES
        (1, 'Kindred', 1, '978-0807083697'),
        (2, 'Invisible Cities', 2, '978-0156453806')",
];

/// Two books by two authors, no violations
pub async fn bookshop() -> anyhow::Result<Fixture> {
    Fixture::create("bookshop.db", BOOKSHOP_SCHEMA).await
}

/// Bookshop plus `orphans` books pointing at authors that do not exist
pub async fn bookshop_with_orphans(orphans: usize) -> anyhow::Result<Fixture> {
    let fixture = bookshop().await?;
    let inserts: Vec<String> = (0..orphans)
        .map(|i| {
            format!(
                "INSERT INTO books (title, author_id) VALUES ('Unattributed {}', {})",
                i,
                500 + i
            )
        })
        .collect();
    let statements: Vec<&str> = inserts.iter().map(String::as_str).collect();
    fixture.execute(&statements).await?;
    Ok(fixture)
}

/// A table with `rows` rows
pub async fn ledger(rows: usize) -> anyhow::Result<Fixture> {
    let fixture = Fixture::create(
        "ledger.db",
        &["CREATE TABLE entries (id INTEGER PRIMARY KEY, account TEXT NOT NULL, amount REAL)"],
    )
    .await?;
    let inserts: Vec<String> = (0..rows)
        .map(|i| {
            format!(
                "INSERT INTO entries (account, amount) VALUES ('acct-{}', {})",
                i % 7,
                i as f64 * 1.25
            )
        })
        .collect();
    let mut statements = vec!["BEGIN"];
    statements.extend(inserts.iter().map(String::as_str));
    statements.push("COMMIT");
    fixture.execute(&statements).await?;
    Ok(fixture)
}
