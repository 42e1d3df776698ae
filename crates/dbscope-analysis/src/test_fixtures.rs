//! Fixture databases for unit tests

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub(crate) struct FixtureDb {
    dir: TempDir,
    path: PathBuf,
}

impl FixtureDb {
    /// A database file with no schema
    pub async fn empty() -> Self {
        Self::with_statements(&[]).await
    }

    pub async fn with_statements(statements: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fixture.db");
        let fixture = Self { dir, path };
        fixture.execute(statements).await;
        fixture
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Run statements on a writable connection with foreign keys off
    pub async fn execute(&self, statements: &[&str]) {
        let mut conn = self.writable().await;
        for statement in statements {
            sqlx::query(statement).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
    }

    pub async fn writable(&self) -> SqliteConnection {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .foreign_keys(false)
            .connect()
            .await
            .unwrap()
    }

    pub fn truncate_to(&self, len: u64) {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .unwrap();
        file.set_len(len).unwrap();
    }

    pub fn file_len(&self) -> u64 {
        std::fs::metadata(&self.path).unwrap().len()
    }
}

pub(crate) const LIBRARY_SCHEMA: &[&str] = &[
    "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
    "CREATE TABLE books (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        author_id INTEGER REFERENCES authors(id) ON DELETE CASCADE,
        published TEXT
    )",
    "CREATE INDEX idx_books_author ON books(author_id)",
    "INSERT INTO authors (id, name, email) VALUES
        (1, 'Ursula K. Le Guin', 'ursula@example.com'),
        (2, 'Terry Pratchett', 'terry@example.org')",
    "INSERT INTO books (id, title, author_id, published) VALUES
        (1, 'A Wizard of Earthsea', 1, '1968-11-01'),
        (2, 'Guards! Guards!', 2, '1989-11-01')",
];

/// Two authors, two books, one valid foreign key
pub(crate) async fn library_fixture() -> FixtureDb {
    FixtureDb::with_statements(LIBRARY_SCHEMA).await
}

/// Library fixture plus `orphans` books whose author does not exist
pub(crate) async fn library_with_orphans(orphans: usize) -> FixtureDb {
    let fixture = library_fixture().await;
    let inserts: Vec<String> = (0..orphans)
        .map(|i| {
            format!(
                "INSERT INTO books (title, author_id) VALUES ('Lost {}', {})",
                i,
                1000 + i
            )
        })
        .collect();
    let statements: Vec<&str> = inserts.iter().map(String::as_str).collect();
    fixture.execute(&statements).await;
    fixture
}

/// A table of `rows` readings, large enough to span several pages
pub(crate) async fn readings_fixture(rows: usize) -> FixtureDb {
    let fixture = FixtureDb::with_statements(&[
        "CREATE TABLE readings (id INTEGER PRIMARY KEY, sensor TEXT NOT NULL, value REAL, taken_at INTEGER)",
    ])
    .await;

    let mut conn = fixture.writable().await;
    let mut tx = conn.begin().await.unwrap();
    for i in 0..rows {
        sqlx::query("INSERT INTO readings (sensor, value, taken_at) VALUES (?1, ?2, ?3)")
            .bind(format!("sensor-{}", i % 4))
            .bind(i as f64 * 0.5)
            .bind(1_700_000_000_i64 + i as i64)
            .execute(&mut *tx)
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();
    conn.close().await.unwrap();
    fixture
}
