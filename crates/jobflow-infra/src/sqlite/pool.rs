//! SQLite connection pools for the job database.
//!
//! Writes go through a single connection so that statements are serialized
//! inside one process. Reads use a separate read-only pool. The journal is WAL
//! so readers never block the writer.
//!
//! Within one process the single writer already orders job claims. Across
//! processes the claim is safe because it is one conditional `UPDATE`.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// File name of the job database inside the data directory.
pub const DATABASE_FILE: &str = "jobflow.db";

const READER_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Reader and writer pools over one database file.
#[derive(Clone)]
pub struct DatabasePool {
    /// Read-only connections for listings and lookups.
    pub reader: SqlitePool,
    /// The only connection allowed to write.
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if needed) the database at `database_url` and apply
    /// pending migrations before any reader connects.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = connect_options(database_url)?;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(options.read_only(true))
            .await?;

        tracing::debug!(database_url, "job database ready");
        Ok(Self { reader, writer })
    }

    /// Close both pools, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.writer.close().await;
        self.reader.close().await;
    }
}

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT))
}

/// Database URL for the job database inside `data_dir`.
pub fn database_url_for(data_dir: &Path) -> String {
    format!(
        "sqlite://{}?mode=rwc",
        data_dir.join(DATABASE_FILE).display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(dir: &Path) -> DatabasePool {
        DatabasePool::new(&database_url_for(dir)).await.unwrap()
    }

    #[tokio::test]
    async fn migrations_create_job_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(dir.path()).await;

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();
        assert_eq!(names, ["jobs", "queue_messages", "tools"]);

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn reopening_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(dir.path()).await;
        sqlx::query(
            "INSERT INTO tools (id, name, description, endpoint, status, created_at, updated_at) \
             VALUES ('t1', 't1', '', 'http://localhost', 'approved', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool.writer)
        .await
        .unwrap();
        pool.close().await;

        let pool = open(dir.path()).await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tools")
            .fetch_one(&pool.reader)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn reader_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open(dir.path()).await;

        let result = sqlx::query("DELETE FROM jobs").execute(&pool.reader).await;
        assert!(result.is_err());
    }

    #[test]
    fn url_points_into_data_dir() {
        let url = database_url_for(Path::new("/tmp/jf"));
        assert_eq!(url, "sqlite:///tmp/jf/jobflow.db?mode=rwc");
    }
}
