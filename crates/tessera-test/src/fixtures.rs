//! Test fixtures for common types.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Map;

use tessera_core::{CardRecord, ToolDescriptor, ToolName};
use tessera_plugins::{FetchedPlugin, ToolManifest};

/// A script plugin that defines all four hooks and announces each call on
/// its tool channel as `"script-<hook>"` with the card id.
pub const SCRIPT_PLUGIN: &str = r#"
fn on_create(card) { this.tool.emit("script-create", card.id); }
fn on_delete(card) { this.tool.emit("script-delete", card.id); }
fn on_load(card) {
    this.tool.emit(card.id, #{ name: card.name });
    this.tool.emit("script-load", card.id);
}
fn on_unload(id) {
    this.tool.emit(id, ());
    this.tool.emit("script-unload", id);
}

#{}
"#;

/// A script that compiles but lacks `on_unload`.
pub const INCOMPLETE_SCRIPT_PLUGIN: &str =
    "fn on_create(card) {} fn on_delete(card) {} fn on_load(card) {} #{}";

/// Parse-free manifest for `name` at version `1.0.0`.
#[must_use]
pub fn test_manifest(name: &str) -> ToolManifest {
    ToolManifest {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        extra: Map::new(),
    }
}

/// A fetched plugin with [`SCRIPT_PLUGIN`] as source and no icon.
#[must_use]
pub fn test_fetched(name: &str) -> FetchedPlugin {
    FetchedPlugin {
        manifest: test_manifest(name),
        source: SCRIPT_PLUGIN.to_string(),
        icon: None,
    }
}

/// A fetched plugin with the given source and an icon.
#[must_use]
pub fn test_fetched_with(name: &str, version: &str, source: &str) -> FetchedPlugin {
    let mut manifest = test_manifest(name);
    manifest.version = version.to_string();
    FetchedPlugin {
        manifest,
        source: source.to_string(),
        icon: Some(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec()),
    }
}

/// A fixed timestamp `seconds` after 2024-01-01T00:00:00Z.
#[must_use]
pub fn test_time(seconds: i64) -> DateTime<Utc> {
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    base.checked_add_signed(chrono::TimeDelta::seconds(seconds))
        .unwrap_or(base)
}

/// An unplaced card named `name` with id `"<tool>-<name>"`.
#[must_use]
pub fn test_card(tool: &str, name: &str) -> CardRecord {
    CardRecord::new(ToolName::from_static(tool), name, "🧪").with_id(format!("{tool}-{name}"))
}

/// A signed descriptor holding `cards`.
#[must_use]
pub fn test_descriptor(tool: &str, cards: Vec<CardRecord>) -> ToolDescriptor {
    ToolDescriptor::new(ToolName::from_static(tool), "1.0.0")
        .with_signed(true)
        .with_cards(cards)
}
