//! Durable key-value storage contract.
//!
//! Values are JSON so callers can store structured records (the token cache)
//! next to plain flags (run overrides) without a schema.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// Durable key-value storage used for the token cache and run configuration.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value, overwriting any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Read a value, returning `default` when the key is absent.
    async fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key).await?.unwrap_or(default))
    }
}

/// Process-local store, used in tests and for runs without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().map(|values| values.len()).unwrap_or(0)
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let values = self
            .values
            .read()
            .map_err(|_| crate::StoreScanError::Storage("memory store poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| crate::StoreScanError::Storage("memory store poisoned".to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| crate::StoreScanError::Storage("memory store poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();
        store
            .set("token.use_fallback", json!(true))
            .await
            .expect("set");
        assert_eq!(
            store.get("token.use_fallback").await.expect("get"),
            Some(json!(true))
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_default() {
        let store = MemoryStore::new();
        let value = store.get_or("missing", json!("fallback")).await.expect("get_or");
        assert_eq!(value, json!("fallback"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.set("k", json!(1)).await.expect("set");
        store.delete("k").await.expect("delete");
        store.delete("k").await.expect("delete again");
        assert!(store.is_empty());
    }
}
