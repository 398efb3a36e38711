//! Persisted tool descriptors.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use tessera_core::{CardRecord, Realm, ToolDescriptor, ToolName};
use tessera_plugins::BuiltinTool;
use tessera_storage::{JsonFileStore, KvStore, KvStoreExt};

use crate::error::{RuntimeError, RuntimeResult};

/// Version recorded for the built-in tools.
pub const BUILTIN_VERSION: &str = "1.0.0";

/// Tool name to [`ToolDescriptor`], backed by any [`KvStore`].
///
/// The store is the source of truth across restarts. Descriptors are always
/// written whole.
#[derive(Clone)]
pub struct InstanceStore {
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for InstanceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceStore")
            .field("closed", &self.store.is_closed())
            .finish_non_exhaustive()
    }
}

impl InstanceStore {
    /// Open `.tessera/main.json` of `realm`, seeding it with the built-in
    /// tools on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] if the file cannot be read or created.
    pub async fn open(realm: &Realm) -> RuntimeResult<Self> {
        let store = JsonFileStore::open(realm.store_path(), Self::defaults()).await?;
        Ok(Self::from_store(Arc::new(store)))
    }

    /// Wrap an existing key/value store.
    #[must_use]
    pub fn from_store(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// The seed document: every built-in tool, signed, with no cards.
    #[must_use]
    pub fn defaults() -> Map<String, Value> {
        BuiltinTool::ALL
            .into_iter()
            .map(|tool| {
                let descriptor =
                    ToolDescriptor::new(tool.tool_name(), BUILTIN_VERSION).with_signed(true);
                let value = serde_json::to_value(descriptor).unwrap_or(Value::Null);
                (tool.name().to_string(), value)
            })
            .collect()
    }

    /// Every readable descriptor, sorted by name. Unreadable entries are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] if the store is closed.
    pub async fn descriptors(&self) -> RuntimeResult<Vec<ToolDescriptor>> {
        let snapshot = self.store.snapshot().await?;
        let mut descriptors = Vec::with_capacity(snapshot.len());
        for (key, value) in snapshot {
            match serde_json::from_value::<ToolDescriptor>(value) {
                Ok(descriptor) if descriptor.name == key.as_str() => descriptors.push(descriptor),
                Ok(descriptor) => {
                    warn!(key = %key, name = %descriptor.name, "Descriptor stored under a foreign key, skipping");
                },
                Err(e) => warn!(key = %key, error = %e, "Unreadable tool descriptor, skipping"),
            }
        }
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(descriptors)
    }

    /// One descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] if the store is closed or the entry
    /// does not parse.
    pub async fn get(&self, tool: &ToolName) -> RuntimeResult<Option<ToolDescriptor>> {
        Ok(self.store.get_json(tool.as_str()).await?)
    }

    /// Write a descriptor in full.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] on write failure.
    pub async fn put(&self, descriptor: &ToolDescriptor) -> RuntimeResult<()> {
        self.store
            .set_json(descriptor.name.as_str(), descriptor)
            .await?;
        debug!(tool = %descriptor.name, cards = descriptor.cards.len(), "Descriptor persisted");
        Ok(())
    }

    /// Write several descriptors in one store write.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] on write failure.
    pub async fn put_many(&self, descriptors: &[ToolDescriptor]) -> RuntimeResult<()> {
        let mut entries = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let value = serde_json::to_value(descriptor).map_err(tessera_storage::StorageError::from)?;
            entries.push((descriptor.name.to_string(), value));
        }
        self.store.set_many(entries).await?;
        Ok(())
    }

    /// Replace the card list of a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ToolNotFound`] if the tool has no descriptor.
    pub async fn put_cards(&self, tool: &ToolName, cards: Vec<CardRecord>) -> RuntimeResult<()> {
        let mut descriptor = self
            .get(tool)
            .await?
            .ok_or_else(|| RuntimeError::ToolNotFound(tool.clone()))?;
        descriptor.cards = cards;
        self.put(&descriptor).await
    }

    /// Delete a descriptor. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] on write failure.
    pub async fn remove(&self, tool: &ToolName) -> RuntimeResult<bool> {
        Ok(self.store.remove(tool.as_str()).await?)
    }

    /// Close the backing store.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] if closing fails.
    pub async fn close(&self) -> RuntimeResult<()> {
        Ok(self.store.close().await?)
    }
}
