//! Environment variable fallbacks.
//!
//! `TESSERA_*` variables fill fields that no config file set. They never
//! override a value written in a file.

use std::collections::{HashMap, HashSet};

use tracing::debug;

/// Environment variable to dotted config field.
pub const ENV_FIELDS: [(&str, &str); 3] = [
    ("TESSERA_REALM", "realm.path"),
    ("TESSERA_LOG", "logging.level"),
    ("TESSERA_REGISTRY_URL", "registry.url"),
];

/// Snapshot the `TESSERA_*` variables of the process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("TESSERA_"))
        .collect()
}

/// Apply [`ENV_FIELDS`] to `merged` for every field not in `set_by_files`.
///
/// Returns how many fields were filled.
pub fn apply_env_fallbacks(
    merged: &mut toml::Value,
    set_by_files: &HashSet<String>,
    env_vars: &HashMap<String, String>,
) -> usize {
    let mut applied = 0_usize;
    for (var, field) in ENV_FIELDS {
        let Some(value) = env_vars.get(var) else {
            continue;
        };
        if value.trim().is_empty() || set_by_files.contains(field) {
            continue;
        }
        if set_path(merged, field, toml::Value::String(value.trim().to_owned())) {
            debug!(var, field, "applied environment fallback");
            applied = applied.saturating_add(1);
        }
    }
    applied
}

fn set_path(root: &mut toml::Value, dotted: &str, value: toml::Value) -> bool {
    let Some((section, key)) = dotted.split_once('.') else {
        return false;
    };
    let Some(table) = root.as_table_mut() else {
        return false;
    };
    let entry = table
        .entry(section.to_owned())
        .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    match entry.as_table_mut() {
        Some(section) => {
            section.insert(key.to_owned(), value);
            true
        },
        None => false,
    }
}
