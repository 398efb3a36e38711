//! JSON-document store persisted to a single file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::kv::{KvStore, validate_key};

/// Store whose whole content is one JSON object on disk.
///
/// Every mutation rewrites the file through a temporary sibling followed by
/// a rename, so readers never observe a half-written document.
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl JsonFileStore {
    /// Open the store at `path`, creating it from `defaults` if the file does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the file or its parent directory cannot
    /// be read or created, and [`StorageError::Serialization`] if the
    /// existing file is not a JSON object.
    pub async fn open(path: impl Into<PathBuf>, defaults: Map<String, Value>) -> StorageResult<Self> {
        let path = path.into();
        let data = match read_document(&path).await? {
            Some(existing) => {
                debug!(path = %path.display(), keys = existing.len(), "Opened store");
                existing
            },
            None => {
                write_document(&path, &defaults).await?;
                info!(path = %path.display(), "Created store from defaults");
                defaults
            },
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
            closed: AtomicBool::new(false),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory document with the current file content.
    ///
    /// A missing file leaves the store empty.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] after close, or any read/parse error.
    pub async fn reload(&self) -> StorageResult<()> {
        self.ensure_open()?;
        let fresh = read_document(&self.path).await?.unwrap_or_default();
        *self.data.lock().await = fresh;
        debug!(path = %self.path.display(), "Reloaded store");
        Ok(())
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.ensure_open()?;
        validate_key(key)?;
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.ensure_open()?;
        validate_key(key)?;
        let mut data = self.data.lock().await;
        data.insert(key.to_string(), value);
        write_document(&self.path, &data).await
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> StorageResult<()> {
        self.ensure_open()?;
        for (key, _) in &entries {
            validate_key(key)?;
        }
        let mut data = self.data.lock().await;
        data.extend(entries);
        write_document(&self.path, &data).await
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        validate_key(key)?;
        let mut data = self.data.lock().await;
        if data.remove(key).is_none() {
            return Ok(false);
        }
        write_document(&self.path, &data).await?;
        Ok(true)
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        let mut keys: Vec<String> = self.data.lock().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn snapshot(&self) -> StorageResult<Map<String, Value>> {
        self.ensure_open()?;
        Ok(self.data.lock().await.clone())
    }

    async fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            warn!(path = %self.path.display(), "Store closed twice");
        } else {
            debug!(path = %self.path.display(), "Store closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn read_document(path: &Path) -> StorageResult<Option<Map<String, Value>>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            });
        },
    };
    if raw.trim().is_empty() {
        return Ok(Some(Map::new()));
    }
    match serde_json::from_str::<Value>(&raw)? {
        Value::Object(map) => Ok(Some(map)),
        other => Err(StorageError::Serialization(format!(
            "{} holds a JSON {} instead of an object",
            path.display(),
            json_kind(&other)
        ))),
    }
}

async fn write_document(path: &Path, data: &Map<String, Value>) -> StorageResult<()> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let body = serde_json::to_vec_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
