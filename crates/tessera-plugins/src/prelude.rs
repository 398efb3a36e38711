//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_plugins::prelude::*;` to import all essential types.

// Errors
pub use crate::{PluginError, PluginResult};

// Plugins and handles
pub use crate::{BuiltinTool, CardState, Plugin, PluginContext, PluginHandle, PluginOrigin};

// Loading and lookup
pub use crate::{PluginLoader, ScriptLimits, ToolMap};

// Registry
pub use crate::{FetchedPlugin, RegistryClient, ToolManifest};
