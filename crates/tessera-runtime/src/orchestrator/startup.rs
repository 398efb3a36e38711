//! Realm startup and unsigned plugin discovery.

use tracing::{debug, info, warn};

use tessera_core::{Realm, ToolDescriptor, ToolName};
use tessera_plugins::{BuiltinTool, PluginHandle, ToolManifest, card_fs};

use super::Orchestrator;
use crate::error::RuntimeResult;

impl Orchestrator {
    /// Populate the tool map and the card list from the instance store.
    pub(super) async fn boot(&mut self, load_unsigned: bool) -> RuntimeResult<()> {
        if load_unsigned {
            self.discover_unsigned().await?;
        }

        let descriptors = self.store.descriptors().await?;
        for descriptor in &descriptors {
            if !descriptor.signed && !load_unsigned {
                debug!(tool = %descriptor.name, "Skipping unsigned tool");
                continue;
            }
            self.admit(descriptor).await;
        }

        // Cards of tools that failed to load stay in the list so the user
        // still sees them.
        self.instances = descriptors.into_iter().flat_map(|d| d.cards).collect();
        self.instances.sort_by_key(|c| c.created_at);

        for name in self.tools.names() {
            self.broadcast(&name);
        }

        info!(
            realm = %self.realm.root().display(),
            tools = self.tools.len(),
            cards = self.instances.len(),
            "Realm started"
        );
        Ok(())
    }

    /// Load a tool through the loader and register it. A tool that fails to
    /// load is left out of the tool map.
    pub(super) async fn admit(&mut self, descriptor: &ToolDescriptor) -> bool {
        let Some(handle) = self.loader.load(descriptor).await else {
            warn!(tool = %descriptor.name, "Tool failed to load and is unavailable");
            return false;
        };
        self.register(handle, descriptor)
    }

    /// Adopt the descriptor's cards as created, answer the tool's
    /// `"card-fs"` requests and put the handle in the tool map.
    pub(super) fn register(&mut self, mut handle: PluginHandle, descriptor: &ToolDescriptor) -> bool {
        handle.adopt(descriptor.cards.iter().map(|c| &c.id));
        card_fs::serve(handle.channel(), &self.realm, &descriptor.name);

        match self.tools.insert(handle) {
            Ok(()) => true,
            Err(e) => {
                warn!(tool = %descriptor.name, error = %e, "Tool registered twice");
                false
            },
        }
    }

    /// Merge `plugins/*/manifest.json` into the instance store.
    ///
    /// New tools are added unsigned. Known tools get their manifest fields
    /// refreshed and keep their cards, icon, trust flag and repository.
    /// Directories named after a built-in are skipped unless the registry
    /// installed that tool.
    async fn discover_unsigned(&mut self) -> RuntimeResult<()> {
        let mut merged = Vec::new();
        for dir in self.fs.list_dirs(&Realm::plugins_dir()).await? {
            let Ok(tool) = ToolName::new(&dir) else {
                warn!(dir = %dir, "Ignoring plugin directory with an invalid name");
                continue;
            };
            let existing = self.store.get(&tool).await?;
            let downloaded = existing.as_ref().is_some_and(ToolDescriptor::is_downloaded);
            if !downloaded && BuiltinTool::from_name(tool.as_str()).is_some() {
                warn!(tool = %tool, "Ignoring plugin directory that shadows a built-in tool");
                continue;
            }
            let Some(raw) = self.fs.read_to_string(&Realm::plugin_manifest(&tool)).await? else {
                debug!(tool = %tool, "Plugin directory has no manifest");
                continue;
            };
            let manifest = match ToolManifest::parse(raw.as_bytes()) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(tool = %tool, error = %e, "Ignoring unreadable manifest");
                    continue;
                },
            };

            let descriptor = match existing {
                Some(existing) => manifest
                    .into_descriptor(existing.signed, existing.icon, existing.cards)
                    .map(|d| ToolDescriptor {
                        repo: existing.repo,
                        ..d
                    }),
                None => manifest.into_descriptor(
                    false,
                    Realm::plugin_icon(&tool).to_string_lossy(),
                    Vec::new(),
                ),
            };
            match descriptor {
                Ok(descriptor) if descriptor.name == tool => merged.push(descriptor),
                Ok(descriptor) => warn!(
                    dir = %tool,
                    manifest = %descriptor.name,
                    "Manifest name does not match its directory"
                ),
                Err(e) => warn!(tool = %tool, error = %e, "Ignoring invalid manifest"),
            }
        }

        if !merged.is_empty() {
            info!(count = merged.len(), "Merged plugins from disk");
            self.store.put_many(&merged).await?;
        }
        Ok(())
    }
}
