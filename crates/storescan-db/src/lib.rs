//! Storescan Database Layer
//!
//! Durable key-value storage on `SQLite` via `SQLx`. The scanner keeps its
//! session token cache and persisted run overrides here through the
//! [`KeyValueStore`] contract from `storescan-core`.
//!
//! # Example
//!
//! ```ignore
//! use storescan_db::Database;
//!
//! let db = Database::new("storescan.db").await?;
//! db.run_migrations().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
pub mod migrations;
pub mod settings;

pub use error::{DatabaseError, Result};

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use storescan_core::KeyValueStore;

/// High-level database handle with migrations.
#[derive(Debug, Clone)]
pub struct Database {
    pool: sqlx::Pool<sqlx::Sqlite>,
}

impl Database {
    /// Open the database at `path` (or `:memory:` for an in-memory database).
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = connection::open_pool(path).await?;
        Ok(Self { pool })
    }

    /// Open the database and apply pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Self::new(path).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Get the current schema version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        &self.pool
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!("Database pool closed");
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> storescan_core::Result<Option<Value>> {
        Ok(settings::get_setting(&self.pool, key).await?)
    }

    async fn set(&self, key: &str, value: Value) -> storescan_core::Result<()> {
        Ok(settings::set_setting(&self.pool, key, &value).await?)
    }

    async fn delete(&self, key: &str) -> storescan_core::Result<()> {
        Ok(settings::delete_setting(&self.pool, key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_key_value_store_round_trip() {
        let db = Database::open(connection::IN_MEMORY).await.expect("open db");
        let store: &dyn KeyValueStore = &db;

        store.set("run.agents", json!(4)).await.expect("set");
        assert_eq!(store.get("run.agents").await.expect("get"), Some(json!(4)));
        assert_eq!(
            store.get_or("absent", json!(false)).await.expect("get_or"),
            json!(false)
        );

        store.delete("run.agents").await.expect("delete");
        assert_eq!(store.get("run.agents").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let tmp = tempfile::TempDir::new().expect("create temp dir");
        let path = tmp.path().join("storescan.db");

        let db = Database::open(&path).await.expect("open db");
        db.set("token.use_fallback", json!(true)).await.expect("set");
        db.close().await;

        let reopened = Database::open(&path).await.expect("reopen db");
        assert_eq!(
            reopened.get("token.use_fallback").await.expect("get"),
            Some(json!(true))
        );
    }
}
