//! Plugin loader: the single factory for built-in, native and script tools.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, json};
use tracing::{debug, error, info};

use tessera_core::{Realm, RealmFs, ToolDescriptor, ToolName};
use tessera_events::{Channel, topics};
use tessera_storage::{JsonFileStore, KvStore};

use crate::builtin::BuiltinTool;
use crate::error::{PluginError, PluginResult};
use crate::handle::PluginHandle;
use crate::plugin::{Plugin, PluginContext, PluginOrigin};
use crate::script::{ScriptLimits, ScriptPlugin};

/// Builds a plugin supplied by the embedding application.
pub type NativeFactory = Arc<dyn Fn(&PluginContext) -> Box<dyn Plugin> + Send + Sync>;

/// Produces [`PluginHandle`]s wired to a fresh tool channel and the tool's
/// private configuration store.
#[derive(Clone)]
pub struct PluginLoader {
    realm: Realm,
    fs: Arc<dyn RealmFs>,
    host: Channel,
    limits: ScriptLimits,
    natives: HashMap<ToolName, NativeFactory>,
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoader")
            .field("realm", &self.realm)
            .field("limits", &self.limits)
            .field("natives", &self.natives.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PluginLoader {
    /// Create a loader for `realm`, publishing global events on `host`.
    #[must_use]
    pub fn new(realm: Realm, fs: Arc<dyn RealmFs>, host: Channel) -> Self {
        Self {
            realm,
            fs,
            host,
            limits: ScriptLimits::default(),
            natives: HashMap::new(),
        }
    }

    /// Set the script engine limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ScriptLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Serve `tool` from an in-process factory instead of a built-in or a
    /// downloaded script.
    #[must_use]
    pub fn with_native(mut self, tool: ToolName, factory: NativeFactory) -> Self {
        self.natives.insert(tool, factory);
        self
    }

    /// The realm this loader serves.
    #[must_use]
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// The host channel handed to every plugin.
    #[must_use]
    pub fn host(&self) -> &Channel {
        &self.host
    }

    /// Open the private store of `tool` and build its context.
    ///
    /// The store location is published on the new tool channel as the
    /// `"config"` event.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Storage`] if the store cannot be opened.
    pub async fn open_context(&self, tool: &ToolName) -> PluginResult<PluginContext> {
        let path = self.realm.tool_config_path(tool);
        let store = JsonFileStore::open(&path, Map::new()).await?;
        let config: Arc<dyn KvStore> = Arc::new(store);

        let channel = Channel::new(tool.as_str());
        channel.emit(
            topics::CONFIG,
            json!({ "path": path.to_string_lossy() }),
        );

        Ok(PluginContext {
            tool: tool.clone(),
            host: self.host.clone(),
            channel,
            config,
        })
    }

    /// Load one of the built-in tools.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownBuiltin`] if `tool` is not built in, or
    /// a storage error if its private store cannot be opened.
    pub async fn load_builtin(&self, tool: &ToolName) -> PluginResult<PluginHandle> {
        let builtin = BuiltinTool::from_name(tool.as_str())
            .ok_or_else(|| PluginError::UnknownBuiltin(tool.to_string()))?;
        let ctx = self.open_context(tool).await?;
        let plugin = builtin.instantiate(&ctx);
        debug!(tool = %tool, "Loaded built-in tool");
        Ok(PluginHandle::new(&ctx, PluginOrigin::Builtin, plugin))
    }

    /// Load a downloaded plugin from `plugins/<name>/index.rhai`.
    ///
    /// Returns `None` if the source is absent or fails to load; failures are
    /// logged.
    pub async fn load_external(&self, descriptor: &ToolDescriptor) -> Option<PluginHandle> {
        match self.try_load_external(descriptor).await {
            Ok(Some(handle)) => Some(handle),
            Ok(None) => {
                info!(tool = %descriptor.name, "No plugin source on disk");
                None
            },
            Err(e) => {
                error!(tool = %descriptor.name, error = %e, "Failed to load plugin");
                None
            },
        }
    }

    async fn try_load_external(
        &self,
        descriptor: &ToolDescriptor,
    ) -> PluginResult<Option<PluginHandle>> {
        let entry = Realm::plugin_entry(&descriptor.name);
        let Some(source) = self.fs.read_to_string(&entry).await? else {
            return Ok(None);
        };
        let ctx = self.open_context(&descriptor.name).await?;
        match ScriptPlugin::load(&source, &ctx, self.limits) {
            Ok(plugin) => {
                debug!(tool = %descriptor.name, "Loaded script plugin");
                Ok(Some(PluginHandle::new(
                    &ctx,
                    PluginOrigin::Script,
                    Box::new(plugin),
                )))
            },
            Err(e) => {
                // The store was opened for a plugin that will never run.
                if let Err(close_err) = ctx.config.close().await {
                    debug!(tool = %descriptor.name, error = %close_err, "Closing unused store failed");
                }
                Err(e)
            },
        }
    }

    /// Load whatever implements `descriptor`: a native factory, a built-in,
    /// or a downloaded script, in that order. A descriptor installed from
    /// the registry always loads its script, even under a built-in's name.
    ///
    /// Returns `None` when the tool cannot be loaded; failures are logged.
    pub async fn load(&self, descriptor: &ToolDescriptor) -> Option<PluginHandle> {
        let tool = &descriptor.name;
        if let Some(factory) = self.natives.get(tool) {
            return match self.open_context(tool).await {
                Ok(ctx) => {
                    let plugin = factory(&ctx);
                    Some(PluginHandle::new(&ctx, PluginOrigin::Native, plugin))
                },
                Err(e) => {
                    error!(tool = %tool, error = %e, "Failed to load native tool");
                    None
                },
            };
        }

        if !descriptor.is_downloaded() && BuiltinTool::from_name(tool.as_str()).is_some() {
            return match self.load_builtin(tool).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!(tool = %tool, error = %e, "Failed to load built-in tool");
                    None
                },
            };
        }

        self.load_external(descriptor).await
    }
}
