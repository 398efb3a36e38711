//! Plugin manifest parsing.
//!
//! A manifest is the `manifest.json` published next to a plugin's source.
//! Only `name` is required; every other field is carried into the tool
//! descriptor untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tessera_core::{CardRecord, ToolDescriptor, ToolName};

use crate::error::{PluginError, PluginResult};

/// Descriptor fields owned by the host. A manifest cannot set them.
const RESERVED_KEYS: [&str; 4] = ["signed", "icon", "cards", "repo"];

/// Parsed `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolManifest {
    /// Display name as published. Lower-cased when it becomes a tool name.
    pub name: String,
    /// Version string.
    #[serde(default)]
    pub version: String,
    /// Any other manifest fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolManifest {
    /// Parse a manifest from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ManifestParse`] if the bytes are not a JSON
    /// object with a string `name`.
    pub fn parse(bytes: &[u8]) -> PluginResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| PluginError::ManifestParse(e.to_string()))
    }

    /// Canonical tool name derived from the manifest name.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ManifestParse`] if the lower-cased name is not a
    /// valid tool name.
    pub fn tool_name(&self) -> PluginResult<ToolName> {
        ToolName::new(&self.name).map_err(|e| PluginError::ManifestParse(e.to_string()))
    }

    /// Build the descriptor persisted for this manifest.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ManifestParse`] if the name is invalid.
    pub fn into_descriptor(
        self,
        signed: bool,
        icon: impl Into<String>,
        cards: Vec<CardRecord>,
    ) -> PluginResult<ToolDescriptor> {
        let name = self.tool_name()?;
        let mut extra = self.extra;
        for key in RESERVED_KEYS {
            extra.remove(key);
        }
        let mut descriptor = ToolDescriptor::new(name, self.version)
            .with_signed(signed)
            .with_icon(icon)
            .with_cards(cards);
        descriptor.extra = extra;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_convert() {
        let manifest = ToolManifest::parse(
            br#"{"name": "Pomodoro", "version": "0.3.1", "author": "x", "signed": false, "repo": "me/fake"}"#,
        )
        .unwrap();
        assert_eq!(manifest.name, "Pomodoro");

        let descriptor = manifest
            .into_descriptor(true, "plugins/pomodoro/icon.svg", Vec::new())
            .unwrap();
        assert_eq!(descriptor.name, "pomodoro");
        assert_eq!(descriptor.version, "0.3.1");
        assert!(descriptor.signed);
        assert_eq!(descriptor.extra.get("author"), Some(&Value::from("x")));
        assert!(!descriptor.extra.contains_key("signed"));
        assert!(!descriptor.extra.contains_key("repo"));
        assert!(!descriptor.is_downloaded());
    }

    #[test]
    fn test_rejects_malformed_manifests() {
        assert!(matches!(
            ToolManifest::parse(b"not json"),
            Err(PluginError::ManifestParse(_))
        ));
        assert!(ToolManifest::parse(br#"{"version": "1"}"#).is_err());

        let bad_name = ToolManifest::parse(br#"{"name": "../evil"}"#).unwrap();
        assert!(bad_name.into_descriptor(true, "", Vec::new()).is_err());
    }
}
