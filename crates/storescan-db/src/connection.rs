//! Database connection management.
//!
//! Opens the `SQLx` pool for a file or in-memory `SQLite` database.

use crate::error::{DatabaseError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Path that selects an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Open a connection pool for the database at `path`.
///
/// Parent directories are created for file databases. An in-memory database
/// lives in a single connection, so its pool is capped at one.
///
/// # Errors
/// Returns `DatabaseError::Open` if the path is not UTF-8 or the pool cannot connect.
pub async fn open_pool(path: impl AsRef<Path>) -> Result<Pool<Sqlite>> {
    let path = path.as_ref();
    let path_str = path
        .to_str()
        .ok_or_else(|| DatabaseError::Open("invalid database path: not valid UTF-8".to_string()))?;

    let in_memory = path_str == IN_MEMORY;
    let connect_options = if in_memory {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DatabaseError::Open(format!("invalid connection string: {e}")))?
    } else {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .connect_with(connect_options)
        .await
        .map_err(|e| DatabaseError::Open(format!("failed to initialize pool: {e}")))?;

    tracing::info!("Database pool created at {}", path_str);
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory_pool() {
        let pool = open_pool(IN_MEMORY).await.expect("open pool");
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .expect("query in-memory database");
    }

    #[tokio::test]
    async fn test_open_file_pool_creates_parent_dirs() {
        let tmp = tempfile::TempDir::new().expect("create temp dir");
        let path = tmp.path().join("nested").join("storescan.db");
        let pool = open_pool(&path).await.expect("open pool");
        pool.close().await;
        assert!(path.exists());
    }
}
