//! Plugin error types.

use tessera_core::{CoreError, ToolName};
use tessera_storage::StorageError;

/// Errors from plugin loading, installation and lookup.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The name is not one of the built-in tools.
    #[error("unknown built-in tool: {0}")]
    UnknownBuiltin(String),

    /// The requested tool is not in the tool map.
    #[error("tool not loaded: {0}")]
    NotFound(ToolName),

    /// A tool with this name is already in the tool map.
    #[error("tool already registered: {0}")]
    AlreadyRegistered(ToolName),

    /// Plugin failed to load.
    #[error("plugin load failed: {tool} - {message}")]
    LoadFailed {
        /// The tool that failed to load.
        tool: ToolName,
        /// Failure reason.
        message: String,
    },

    /// Plugin source failed to compile or its constructor threw.
    #[error("script error in {tool}: {message}")]
    Script {
        /// The tool whose script failed.
        tool: ToolName,
        /// Engine error message.
        message: String,
    },

    /// Plugin source does not define one of the four lifecycle hooks.
    #[error("plugin {tool} does not define `{hook}`")]
    MissingHook {
        /// The offending tool.
        tool: ToolName,
        /// The missing hook signature.
        hook: &'static str,
    },

    /// Failed to parse a plugin manifest.
    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    /// Remote registry failure.
    #[error("registry error: {message}")]
    Registry {
        /// Description of the registry failure.
        message: String,
    },

    /// Download exceeds the maximum allowed size.
    #[error("download too large: {size} bytes (limit: {limit} bytes)")]
    PackageTooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        limit: u64,
    },

    /// Repository reference is not `owner/repo`.
    #[error("invalid repository '{0}', expected owner/repo")]
    InvalidRepo(String),

    /// Private store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Path or filesystem failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
