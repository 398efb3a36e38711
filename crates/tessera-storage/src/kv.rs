//! Key/value store trait and the in-memory implementation.
//!
//! Values are JSON documents. Keys are flat strings; each store is already
//! private to one owner (the realm, or one tool), so there is no namespace
//! layer. Typed access goes through [`KvStoreExt`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that a key is safe for storage.
///
/// Keys must be non-empty and must not contain the null byte.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] describing the violation.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// JSON key/value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value by key. Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Set a value, overwriting any existing one.
    async fn set(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Set several values in one write.
    async fn set_many(&self, entries: Vec<(String, Value)>) -> StorageResult<()>;

    /// Remove a key. Returns `true` if it existed.
    async fn remove(&self, key: &str) -> StorageResult<bool>;

    /// All keys, sorted.
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Copy of the whole document.
    async fn snapshot(&self) -> StorageResult<Map<String, Value>>;

    /// Close the store. Every later call fails with [`StorageError::Closed`].
    async fn close(&self) -> StorageResult<()>;

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}

/// Typed helpers over any [`KvStore`].
#[async_trait]
pub trait KvStoreExt: KvStore {
    /// Get and deserialize a value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored value does not
    /// match `T`, or any error of the underlying store.
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize and set a value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if `value` cannot be encoded,
    /// or any error of the underlying store.
    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> StorageResult<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value).await
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory store for tests and ephemeral data.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RwLock<BTreeMap<String, Value>>,
    closed: AtomicBool,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with `defaults`.
    #[must_use]
    pub fn with_defaults(defaults: Map<String, Value>) -> Self {
        Self {
            data: RwLock::new(defaults.into_iter().collect()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.ensure_open()?;
        validate_key(key)?;
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.ensure_open()?;
        validate_key(key)?;
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StorageResult<()> {
        self.ensure_open()?;
        for (key, _) in &entries {
            validate_key(key)?;
        }
        self.data.write().await.extend(entries);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        validate_key(key)?;
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.data.read().await.keys().cloned().collect())
    }

    async fn snapshot(&self) -> StorageResult<Map<String, Value>> {
        self.ensure_open()?;
        Ok(self
            .data
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryKvStore::new();
        assert!(store.get("k").await.unwrap().is_none());

        store.set("k", json!({ "a": 1 })).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({ "a": 1 })));

        assert!(store.remove("k").await.unwrap());
        assert!(!store.remove("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_many_and_keys_sorted() {
        let store = MemoryKvStore::new();
        store
            .set_many(vec![("b".into(), json!(2)), ("a".into(), json!(1))])
            .await
            .unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_defaults_are_visible() {
        let mut defaults = Map::new();
        defaults.insert("kanban".into(), json!({ "cards": [] }));
        let store = MemoryKvStore::with_defaults(defaults);
        assert!(store.get("kanban").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let store = MemoryKvStore::new();
        assert!(matches!(
            store.set("", json!(1)).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("a\0b").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_store_refuses_everything() {
        let store = MemoryKvStore::new();
        store.set("k", json!(1)).await.unwrap();
        store.close().await.unwrap();

        assert!(store.is_closed());
        assert!(matches!(store.get("k").await, Err(StorageError::Closed)));
        assert!(matches!(
            store.set("k", json!(2)).await,
            Err(StorageError::Closed)
        ));
        assert!(matches!(store.keys().await, Err(StorageError::Closed)));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Column {
        name: String,
        max: u32,
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let store = MemoryKvStore::new();
        let column = Column {
            name: "todo".into(),
            max: 10,
        };
        store.set_json("col", &column).await.unwrap();
        let back: Column = store.get_json("col").await.unwrap().unwrap();
        assert_eq!(back, column);

        store.set("bad", json!("not a column")).await.unwrap();
        let err = store.get_json::<Column>("bad").await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let store: std::sync::Arc<dyn KvStore> = std::sync::Arc::new(MemoryKvStore::new());
        store.set_json("n", &5_u32).await.unwrap();
        assert_eq!(store.get_json::<u32>("n").await.unwrap(), Some(5));
    }
}
