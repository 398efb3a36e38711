//! Table of live plugin handles.

use std::collections::BTreeMap;

use tracing::{info, warn};

use tessera_core::ToolName;
use tessera_events::Channel;

use crate::error::{PluginError, PluginResult};
use crate::handle::PluginHandle;

/// Tool name to live [`PluginHandle`].
///
/// A tool that failed to load is simply absent.
#[derive(Default)]
pub struct ToolMap {
    handles: BTreeMap<ToolName, PluginHandle>,
}

impl ToolMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::AlreadyRegistered`] if the tool is present.
    pub fn insert(&mut self, handle: PluginHandle) -> PluginResult<()> {
        let tool = handle.tool().clone();
        if self.handles.contains_key(&tool) {
            return Err(PluginError::AlreadyRegistered(tool));
        }
        info!(tool = %tool, origin = ?handle.origin(), "Registered tool");
        self.handles.insert(tool, handle);
        Ok(())
    }

    /// Remove and return a handle.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] if the tool is absent.
    pub fn remove(&mut self, tool: &ToolName) -> PluginResult<PluginHandle> {
        let handle = self
            .handles
            .remove(tool)
            .ok_or_else(|| PluginError::NotFound(tool.clone()))?;
        info!(tool = %tool, "Unregistered tool");
        Ok(handle)
    }

    /// Get a handle.
    #[must_use]
    pub fn get(&self, tool: &ToolName) -> Option<&PluginHandle> {
        self.handles.get(tool)
    }

    /// Get a handle mutably, for hook calls.
    #[must_use]
    pub fn get_mut(&mut self, tool: &ToolName) -> Option<&mut PluginHandle> {
        self.handles.get_mut(tool)
    }

    /// Whether the tool is loaded.
    #[must_use]
    pub fn contains(&self, tool: &ToolName) -> bool {
        self.handles.contains_key(tool)
    }

    /// The tool's channel, if loaded.
    #[must_use]
    pub fn channel(&self, tool: &ToolName) -> Option<&Channel> {
        self.handles.get(tool).map(PluginHandle::channel)
    }

    /// Loaded tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<ToolName> {
        self.handles.keys().cloned().collect()
    }

    /// Number of loaded tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no tool is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Unload every loaded card, close every private store and empty the map.
    pub async fn close_all(&mut self) {
        let handles = std::mem::take(&mut self.handles);
        for (tool, mut handle) in handles {
            handle.unload_all().await;
            handle.close().await;
            if !handle.loaded_cards().is_empty() {
                warn!(tool = %tool, "Cards still loaded after teardown");
            }
        }
    }
}

impl std::fmt::Debug for ToolMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolMap")
            .field("tools", &self.handles.keys().collect::<Vec<_>>())
            .finish()
    }
}
