//! On-disk layout of a realm.
//!
//! ```text
//! <root>/
//!   .tessera/main.json          instance store
//!   .tessera/config.toml        realm configuration overrides
//!   plugins/<tool>/index.rhai   downloaded plugin source
//!   plugins/<tool>/manifest.json
//!   plugins/<tool>/icon.svg
//!   main/<tool>/config.json     private tool configuration store
//!   main/<tool>/<card>/         card data directory
//! ```

use std::path::{Path, PathBuf};

use crate::error::CoreResult;
use crate::fs::validate_component;
use crate::ids::ToolName;

/// Name of the realm's hidden metadata directory.
pub const META_DIR: &str = ".tessera";
/// Directory holding downloaded plugins.
pub const PLUGINS_DIR: &str = "plugins";
/// Directory holding per-tool data.
pub const MAIN_DIR: &str = "main";
/// File name of the plugin entry point.
pub const PLUGIN_ENTRY: &str = "index.rhai";
/// File name of the plugin manifest.
pub const PLUGIN_MANIFEST: &str = "manifest.json";
/// File name of the plugin icon.
pub const PLUGIN_ICON: &str = "icon.svg";

/// A workspace directory owning one instance store and one tool map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Realm {
    root: PathBuf,
}

impl Realm {
    /// Create a realm rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Realm root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `.tessera/main.json`
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.root.join(META_DIR).join("main.json")
    }

    /// `.tessera/config.toml`
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join(META_DIR).join("config.toml")
    }

    /// Absolute path of the `main/<tool>/config.json` tool store.
    #[must_use]
    pub fn tool_config_path(&self, tool: &ToolName) -> PathBuf {
        self.root.join(Self::tool_dir(tool)).join("config.json")
    }

    /// Resolve a realm-relative path.
    #[must_use]
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Relative `plugins/`
    #[must_use]
    pub fn plugins_dir() -> PathBuf {
        PathBuf::from(PLUGINS_DIR)
    }

    /// Relative `plugins/<tool>`
    #[must_use]
    pub fn plugin_dir(tool: &ToolName) -> PathBuf {
        Path::new(PLUGINS_DIR).join(tool.as_str())
    }

    /// Relative `plugins/<tool>/index.rhai`
    #[must_use]
    pub fn plugin_entry(tool: &ToolName) -> PathBuf {
        Self::plugin_dir(tool).join(PLUGIN_ENTRY)
    }

    /// Relative `plugins/<tool>/manifest.json`
    #[must_use]
    pub fn plugin_manifest(tool: &ToolName) -> PathBuf {
        Self::plugin_dir(tool).join(PLUGIN_MANIFEST)
    }

    /// Relative `plugins/<tool>/icon.svg`
    #[must_use]
    pub fn plugin_icon(tool: &ToolName) -> PathBuf {
        Self::plugin_dir(tool).join(PLUGIN_ICON)
    }

    /// Relative `main/<tool>`
    #[must_use]
    pub fn tool_dir(tool: &ToolName) -> PathBuf {
        Path::new(MAIN_DIR).join(tool.as_str())
    }

    /// Relative `main/<tool>/<card>`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPath`](crate::CoreError::InvalidPath) if
    /// the card name is not a single, plain path component.
    pub fn card_dir(tool: &ToolName, card_name: &str) -> CoreResult<PathBuf> {
        validate_component(card_name)?;
        Ok(Self::tool_dir(tool).join(card_name))
    }
}
