//! Tessera Plugins - Tool implementations and their lifecycle.
//!
//! This crate provides:
//! - The [`Plugin`] trait: exactly four lifecycle hooks
//! - [`PluginHandle`], which wraps a plugin, guards the per-card lifecycle
//!   state machine and turns every failure into a [`HookOutcome`]
//! - The closed set of built-in tools ([`BuiltinTool`])
//! - A rhai-based adapter for downloaded plugins ([`ScriptPlugin`])
//! - [`PluginLoader`], the single factory for both kinds
//! - [`ToolMap`], the table of live handles
//! - [`RegistryClient`] for fetching plugins from a remote registry
//! - [`CardFs`], the scoped card filesystem served on `"card-fs"`
//!
//! [`HookOutcome`]: tessera_core::HookOutcome

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod builtin;
pub mod card_fs;
pub mod error;
pub mod handle;
#[cfg(feature = "http")]
pub mod http;
pub mod loader;
pub mod manifest;
pub mod plugin;
pub mod registry;
pub mod script;
pub mod tool_map;

pub use builtin::BuiltinTool;
pub use card_fs::{CardDirEntry, CardFs, CardFsOp, CardFsRequest};
pub use error::{PluginError, PluginResult};
pub use handle::{CardState, PluginHandle};
#[cfg(feature = "http")]
pub use http::{DEFAULT_REGISTRY_URL, HttpRegistryClient};
pub use loader::{NativeFactory, PluginLoader};
pub use manifest::ToolManifest;
pub use plugin::{Plugin, PluginContext, PluginOrigin};
pub use registry::{FetchedPlugin, RegistryClient, validate_repo};
pub use script::{ScriptLimits, ScriptPlugin};
pub use tool_map::ToolMap;
