//! The orchestrator: one realm's instance store, tool map and card list.
//!
//! Every mutating operation follows the same discipline:
//!
//! 1. compute the new in-memory card list
//! 2. write the affected tool's cards to the instance store in full
//! 3. invoke lifecycle hooks
//! 4. re-broadcast the tool's metadata
//!
//! Operations take `&mut self`, so one orchestrator runs them one at a time.
//! Share it between tasks behind a `tokio::sync::Mutex`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use tessera_core::{
    CardId, CardRecord, LocalRealmFs, Realm, RealmFs, ToolDescriptor, ToolMetadata, ToolName,
};
use tessera_events::{Channel, topics};
use tessera_plugins::{
    HttpRegistryClient, NativeFactory, PluginLoader, RegistryClient, ScriptLimits, ToolMap,
};

use crate::error::{RuntimeError, RuntimeResult};
use crate::store::InstanceStore;

mod cards;
mod startup;
mod tools;

#[cfg(test)]
mod tests;

pub use tools::InstallOutcome;

/// Reconciles the instance store, the tool map and the card list of one
/// realm, and executes every tool and card operation.
pub struct Orchestrator {
    pub(super) realm: Realm,
    pub(super) fs: Arc<dyn RealmFs>,
    pub(super) store: InstanceStore,
    pub(super) tools: ToolMap,
    pub(super) loader: PluginLoader,
    pub(super) registry: Arc<dyn RegistryClient>,
    pub(super) host: Channel,
    /// Every card of every tool, oldest first.
    pub(super) instances: Vec<CardRecord>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("realm", &self.realm)
            .field("tools", &self.tools)
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Start configuring an orchestrator for the realm at `root`.
    #[must_use]
    pub fn builder(root: impl Into<PathBuf>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(root)
    }

    /// The realm this orchestrator owns.
    #[must_use]
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// The UI-facing card list, ordered by creation time.
    #[must_use]
    pub fn instances(&self) -> &[CardRecord] {
        &self.instances
    }

    /// Find a card by tool and id.
    #[must_use]
    pub fn instance(&self, tool: &ToolName, id: &CardId) -> Option<&CardRecord> {
        self.instances
            .iter()
            .find(|c| &c.tool == tool && &c.id == id)
    }

    /// Names of the tools with a live plugin.
    #[must_use]
    pub fn tool_names(&self) -> Vec<ToolName> {
        self.tools.names()
    }

    /// The live tool map.
    #[must_use]
    pub fn tool_map(&self) -> &ToolMap {
        &self.tools
    }

    /// A tool's channel, if the tool is loaded.
    #[must_use]
    pub fn channel(&self, tool: &ToolName) -> Option<&Channel> {
        self.tools.channel(tool)
    }

    /// The host channel for global events.
    #[must_use]
    pub fn host_channel(&self) -> &Channel {
        &self.host
    }

    /// The persisted descriptor of a tool.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] if the instance store is closed.
    pub async fn descriptor(&self, tool: &ToolName) -> RuntimeResult<Option<ToolDescriptor>> {
        self.store.get(tool).await
    }

    /// Every persisted descriptor, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] if the instance store is closed.
    pub async fn descriptors(&self) -> RuntimeResult<Vec<ToolDescriptor>> {
        self.store.descriptors().await
    }

    /// Tear the realm down: unload every loaded card, close every private
    /// store and the instance store.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] if the instance store fails to close.
    pub async fn shutdown(mut self) -> RuntimeResult<()> {
        self.tools.close_all().await;
        self.store.close().await?;
        debug!(realm = %self.realm.root().display(), "Realm shut down");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Synchronisation helpers
    // -----------------------------------------------------------------

    /// Cards of `tool`, in list order.
    pub(super) fn cards_of(&self, tool: &ToolName) -> Vec<CardRecord> {
        self.instances
            .iter()
            .filter(|c| &c.tool == tool)
            .cloned()
            .collect()
    }

    /// Write the tool's slice of the card list to the instance store.
    pub(super) async fn persist(&self, tool: &ToolName) -> RuntimeResult<()> {
        self.store.put_cards(tool, self.cards_of(tool)).await
    }

    /// Publish the tool's card list on its channel.
    pub(super) fn broadcast(&self, tool: &ToolName) {
        let Some(channel) = self.tools.channel(tool) else {
            debug!(tool = %tool, "Tool not loaded, skipping metadata broadcast");
            return;
        };
        let metadata = ToolMetadata::for_tool(tool, &self.instances);
        channel.emit(topics::METADATA, metadata.to_value());
    }

    pub(super) fn position(&self, tool: &ToolName, id: &CardId) -> RuntimeResult<usize> {
        self.instances
            .iter()
            .position(|c| &c.tool == tool && &c.id == id)
            .ok_or_else(|| RuntimeError::CardNotFound {
                tool: tool.clone(),
                card_id: id.clone(),
            })
    }

    pub(super) fn ensure_unique_name(
        &self,
        tool: &ToolName,
        name: &str,
        except: Option<&CardId>,
    ) -> RuntimeResult<()> {
        let taken = self
            .instances
            .iter()
            .any(|c| &c.tool == tool && c.name == name && Some(&c.id) != except);
        if taken {
            warn!(tool = %tool, name, "Rejected duplicate card name");
            return Err(RuntimeError::DuplicateCardName {
                tool: tool.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Configures and starts an [`Orchestrator`].
pub struct OrchestratorBuilder {
    realm: Realm,
    fs: Option<Arc<dyn RealmFs>>,
    store: Option<InstanceStore>,
    registry: Option<Arc<dyn RegistryClient>>,
    host: Channel,
    load_unsigned: bool,
    limits: ScriptLimits,
    natives: Vec<(ToolName, NativeFactory)>,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("realm", &self.realm)
            .field("load_unsigned", &self.load_unsigned)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl OrchestratorBuilder {
    /// Builder for the realm at `root` with default collaborators.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            realm: Realm::new(root),
            fs: None,
            store: None,
            registry: None,
            host: Channel::new("host"),
            load_unsigned: false,
            limits: ScriptLimits::default(),
            natives: Vec::new(),
        }
    }

    /// Use a custom filesystem for card and plugin directories.
    #[must_use]
    pub fn fs(mut self, fs: Arc<dyn RealmFs>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Use a custom instance store instead of `.tessera/main.json`.
    #[must_use]
    pub fn store(mut self, store: InstanceStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom registry client.
    #[must_use]
    pub fn registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share an existing host channel.
    #[must_use]
    pub fn host(mut self, host: Channel) -> Self {
        self.host = host;
        self
    }

    /// Load tools whose descriptors are not signed, and discover plugins
    /// dropped into `plugins/` by hand.
    #[must_use]
    pub fn load_unsigned(mut self, enabled: bool) -> Self {
        self.load_unsigned = enabled;
        self
    }

    /// Script engine limits for downloaded plugins.
    #[must_use]
    pub fn script_limits(mut self, limits: ScriptLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Serve `tool` from an in-process plugin factory.
    #[must_use]
    pub fn native(mut self, tool: ToolName, factory: NativeFactory) -> Self {
        self.natives.push((tool, factory));
        self
    }

    /// Open the instance store, load every admissible tool and build the
    /// card list.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Storage`] if the instance store cannot be
    /// opened, or [`RuntimeError::Plugin`] if the default registry client
    /// cannot be built.
    pub async fn start(self) -> RuntimeResult<Orchestrator> {
        let fs = self
            .fs
            .unwrap_or_else(|| Arc::new(LocalRealmFs::new(self.realm.root())));
        let store = match self.store {
            Some(store) => store,
            None => InstanceStore::open(&self.realm).await?,
        };
        let registry: Arc<dyn RegistryClient> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(HttpRegistryClient::new()?),
        };

        let mut loader = PluginLoader::new(self.realm.clone(), Arc::clone(&fs), self.host.clone())
            .with_limits(self.limits);
        for (tool, factory) in self.natives {
            loader = loader.with_native(tool, factory);
        }

        let mut orchestrator = Orchestrator {
            realm: self.realm,
            fs,
            store,
            tools: ToolMap::new(),
            loader,
            registry,
            host: self.host,
            instances: Vec::new(),
        };
        orchestrator.boot(self.load_unsigned).await?;
        Ok(orchestrator)
    }
}
