//! Key-value rows in the `settings` table.
//!
//! Values are stored as JSON text; the last write for a key wins.

use crate::error::{DatabaseError, Result};
use serde_json::Value;
use sqlx::SqlitePool;

/// Insert or overwrite a setting.
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &Value) -> Result<()> {
    let value_str = serde_json::to_string(value)
        .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

    sqlx::query(
        r"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, datetime('now'))
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = datetime('now')
        ",
    )
    .bind(key)
    .bind(value_str)
    .execute(pool)
    .await?;

    Ok(())
}

/// Read a setting, `None` if absent.
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<Value>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    row.map(|(value_str,)| {
        serde_json::from_str(&value_str)
            .map_err(|e| DatabaseError::SerializationError(format!("setting '{key}': {e}")))
    })
    .transpose()
}

/// Remove a setting. Absent keys are ignored.
pub async fn delete_setting(pool: &SqlitePool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;

    Ok(())
}

/// Keys starting with `prefix`, sorted.
pub async fn list_keys(pool: &SqlitePool, prefix: &str) -> Result<Vec<String>> {
    let keys = sqlx::query_scalar::<_, String>(
        "SELECT key FROM settings WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
    )
    .bind(prefix)
    .fetch_all(pool)
    .await?;

    Ok(keys)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Database;

    async fn create_test_db() -> Database {
        let db = Database::new(crate::connection::IN_MEMORY)
            .await
            .expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    #[tokio::test]
    async fn test_set_and_get_setting() {
        let db = create_test_db().await;
        let pool = db.pool();

        let value = serde_json::json!({"value": "tok", "source": "document_scan"});
        set_setting(pool, "token.session", &value).await.unwrap();

        let retrieved = get_setting(pool, "token.session").await.unwrap();
        assert_eq!(retrieved, Some(value));
    }

    #[tokio::test]
    async fn test_overwrite_is_last_write_wins() {
        let db = create_test_db().await;
        let pool = db.pool();

        set_setting(pool, "token.session", &serde_json::json!("first"))
            .await
            .unwrap();
        set_setting(pool, "token.session", &serde_json::json!("second"))
            .await
            .unwrap();

        let retrieved = get_setting(pool, "token.session").await.unwrap();
        assert_eq!(retrieved, Some(serde_json::json!("second")));
    }

    #[tokio::test]
    async fn test_get_nonexistent_setting() {
        let db = create_test_db().await;
        let result = get_setting(db.pool(), "does_not_exist").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_delete_setting() {
        let db = create_test_db().await;
        let pool = db.pool();

        set_setting(pool, "token.use_fallback", &serde_json::json!(true))
            .await
            .unwrap();
        delete_setting(pool, "token.use_fallback").await.unwrap();

        let result = get_setting(pool, "token.use_fallback").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_list_keys_by_prefix() {
        let db = create_test_db().await;
        let pool = db.pool();

        for key in ["token.session", "token.use_fallback", "run.agents"] {
            set_setting(pool, key, &serde_json::json!(1)).await.unwrap();
        }

        let keys = list_keys(pool, "token.").await.unwrap();
        assert_eq!(keys, vec!["token.session", "token.use_fallback"]);
    }
}
