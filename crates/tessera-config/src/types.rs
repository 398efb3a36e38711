//! Configuration struct definitions.
//!
//! Every section implements [`Default`] with the values of the embedded
//! `defaults.toml`, so a bare `[section]` header yields a working setup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which realm to open and what to load in it.
    pub realm: RealmSection,
    /// Plugin registry access.
    pub registry: RegistrySection,
    /// Script engine limits for downloaded plugins.
    pub scripts: ScriptsSection,
    /// Log level, format and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// RealmSection
// ---------------------------------------------------------------------------

/// Realm selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmSection {
    /// Realm directory. Empty means the current directory.
    pub path: String,
    /// Load unsigned tools and discover hand-installed plugins.
    pub load_unsigned: bool,
}

impl RealmSection {
    /// The configured realm directory, if any.
    #[must_use]
    pub fn root(&self) -> Option<PathBuf> {
        let trimmed = self.path.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }
}

// ---------------------------------------------------------------------------
// RegistrySection
// ---------------------------------------------------------------------------

/// Remote plugin registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// Base URL; files live at `<url>/<owner>/<repo>/main/<file>`.
    pub url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Largest accepted download in bytes.
    pub max_download_bytes: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            url: "https://raw.githubusercontent.com".to_owned(),
            timeout_secs: 30,
            max_download_bytes: 5_242_880,
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptsSection
// ---------------------------------------------------------------------------

/// Script engine limits. `0` disables a limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsSection {
    /// Operations a single hook may execute.
    pub max_operations: u64,
    /// Maximum function call depth.
    pub max_call_levels: usize,
}

impl Default for ScriptsSection {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate directives such as `"tessera_plugins=debug"`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
