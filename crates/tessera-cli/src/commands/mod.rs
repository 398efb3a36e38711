//! Subcommand handlers. Each takes the shared orchestrator lock for the
//! duration of one operation.

pub(crate) mod cards;
pub(crate) mod tools;

use tessera_core::{CardId, ToolName};

/// Parse a user-supplied tool name.
pub(crate) fn tool_arg(name: &str) -> anyhow::Result<ToolName> {
    Ok(ToolName::new(name)?)
}

/// Parse a user-supplied card id.
pub(crate) fn card_arg(id: &str) -> CardId {
    CardId::new(id.trim())
}
