//! Tool install, update and uninstall.

use serde_json::Value;
use tracing::{debug, info, warn};

use tessera_core::{Realm, ToolDescriptor, ToolName};
use tessera_plugins::{FetchedPlugin, PluginError};

use super::Orchestrator;
use crate::error::{RuntimeError, RuntimeResult};

/// What happened after a successful install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The tool was installed fresh. `loaded` tells whether its plugin is
    /// live in this session.
    Installed {
        /// Whether the plugin loaded and joined the tool map.
        loaded: bool,
    },
    /// The tool was updated on disk; the new code runs after a restart.
    RestartRequired,
}

impl Orchestrator {
    /// Install or update a tool from the registry.
    ///
    /// The descriptor records `repo`, so the downloaded code is what loads
    /// from then on, even under a built-in's name.
    ///
    /// The registry fetch and manifest checks happen before anything is
    /// written. If writing the files or the descriptor fails on a fresh
    /// install, the plugin directory is removed again.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ToolAlreadyInstalled`] for a fresh install of a
    ///   known tool
    /// - [`RuntimeError::Plugin`] on registry failures or a manifest whose
    ///   name does not match `name`
    /// - [`RuntimeError::Core`] or [`RuntimeError::Storage`] if writing the
    ///   plugin files or the descriptor fails
    pub async fn install(
        &mut self,
        name: &str,
        repo: &str,
        is_update: bool,
    ) -> RuntimeResult<InstallOutcome> {
        let tool = ToolName::new(name)?;
        let existing = self.store.get(&tool).await?;
        if existing.is_some() && !is_update {
            return Err(RuntimeError::ToolAlreadyInstalled(tool));
        }

        info!(tool = %tool, repo, is_update, "Fetching plugin");
        let fetched = self.registry.fetch(repo).await?;
        let manifest_tool = fetched.manifest.tool_name()?;
        if manifest_tool != tool {
            return Err(PluginError::ManifestParse(format!(
                "manifest names '{manifest_tool}', expected '{tool}'"
            ))
            .into());
        }

        let descriptor = descriptor_for(&tool, repo, &fetched, existing.as_ref())?;
        if let Err(e) = self.persist_plugin(&tool, &fetched, &descriptor).await {
            if existing.is_none() {
                self.discard_plugin_files(&tool).await;
            }
            return Err(e);
        }

        match existing {
            Some(_) => {
                info!(tool = %tool, version = %descriptor.version, "Tool updated, restart to load the new version");
                Ok(InstallOutcome::RestartRequired)
            },
            None => {
                let loaded = match self.loader.load_external(&descriptor).await {
                    Some(handle) => self.register(handle, &descriptor),
                    None => false,
                };
                self.broadcast(&tool);
                info!(tool = %tool, version = %descriptor.version, loaded, "Tool installed");
                Ok(InstallOutcome::Installed { loaded })
            },
        }
    }

    async fn persist_plugin(
        &self,
        tool: &ToolName,
        fetched: &FetchedPlugin,
        descriptor: &ToolDescriptor,
    ) -> RuntimeResult<()> {
        self.write_plugin_files(tool, fetched).await?;
        self.store.put(descriptor).await
    }

    async fn discard_plugin_files(&self, tool: &ToolName) {
        let dir = Realm::plugin_dir(tool);
        match self.fs.remove_dir(&dir).await {
            Ok(()) => debug!(tool = %tool, "Removed files of a failed install"),
            Err(e) => warn!(tool = %tool, dir = %dir.display(), error = %e, "Failed to remove files of a failed install"),
        }
    }

    async fn write_plugin_files(&self, tool: &ToolName, fetched: &FetchedPlugin) -> RuntimeResult<()> {
        let manifest = serde_json::to_vec_pretty(&fetched.manifest)
            .map_err(|e| PluginError::ManifestParse(e.to_string()))?;

        self.fs.create_dir(&Realm::plugin_dir(tool)).await?;
        self.fs
            .write_file(&Realm::plugin_entry(tool), fetched.source.as_bytes())
            .await?;
        self.fs
            .write_file(&Realm::plugin_manifest(tool), &manifest)
            .await?;
        if let Some(icon) = &fetched.icon {
            self.fs.write_file(&Realm::plugin_icon(tool), icon).await?;
        }
        Ok(())
    }

    /// Remove a tool, its cards and its files.
    ///
    /// Every placed or loaded card is unloaded, then every card is deleted.
    /// Hook failures are logged and never stop the sweep. The descriptor and
    /// tool map entry are removed regardless.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ToolNotFound`] if the tool has no descriptor,
    /// or [`RuntimeError::Storage`] if the descriptor cannot be removed.
    pub async fn uninstall(&mut self, tool: &ToolName) -> RuntimeResult<()> {
        if self.store.get(tool).await?.is_none() {
            return Err(RuntimeError::ToolNotFound(tool.clone()));
        }
        let cards = self.cards_of(tool);

        if let Some(handle) = self.tools.get_mut(tool) {
            for card in &cards {
                if card.is_placed || handle.is_loaded(&card.id) {
                    let outcome = handle.on_unload(&card.id).await;
                    if !outcome.is_ok() {
                        warn!(tool = %tool, card_id = %card.id, outcome = %outcome, "Unload failed during uninstall");
                    }
                }
            }
            for card in &cards {
                let outcome = handle.on_delete(card).await;
                if !outcome.is_ok() {
                    warn!(tool = %tool, card_id = %card.id, outcome = %outcome, "Delete failed during uninstall");
                }
            }
        } else {
            warn!(tool = %tool, cards = cards.len(), "Uninstalling a tool that is not loaded, hooks skipped");
        }

        self.store.remove(tool).await?;
        if let Ok(handle) = self.tools.remove(tool) {
            handle.close().await;
        }

        for dir in [Realm::tool_dir(tool), Realm::plugin_dir(tool)] {
            if let Err(e) = self.fs.remove_dir(&dir).await {
                warn!(tool = %tool, dir = %dir.display(), error = %e, "Failed to remove tool directory");
            }
        }

        self.instances.retain(|c| &c.tool != tool);
        info!(tool = %tool, cards = cards.len(), "Tool uninstalled");
        Ok(())
    }
}

/// The descriptor persisted for a fetched plugin. Updates keep the cards
/// and, without a new icon, the old one.
fn descriptor_for(
    tool: &ToolName,
    repo: &str,
    fetched: &FetchedPlugin,
    existing: Option<&ToolDescriptor>,
) -> RuntimeResult<ToolDescriptor> {
    let icon = if fetched.icon.is_some() {
        Realm::plugin_icon(tool).to_string_lossy().into_owned()
    } else {
        existing.map(|d| d.icon.clone()).unwrap_or_default()
    };
    let cards = existing.map(|d| d.cards.clone()).unwrap_or_default();

    let mut descriptor = fetched
        .manifest
        .clone()
        .into_descriptor(true, icon, cards)?
        .with_repo(repo);
    descriptor
        .extra
        .insert("title".to_string(), Value::String(fetched.manifest.name.clone()));
    Ok(descriptor)
}
