//! Event names shared between the host, the orchestrator and tools.

/// Card list broadcast on a tool channel after every change.
pub const METADATA: &str = "metadata";

/// Scoped card filesystem requests, answered by the host.
pub const CARD_FS: &str = "card-fs";

/// Location of the tool's private configuration store.
pub const CONFIG: &str = "config";

/// Host channel event asking the shell to open a tool settings panel.
pub const TOOL_SETTINGS: &str = "tool-settings";

/// Event delivering transferred task payloads to `target`.
///
/// `target` is a tool name or a card name, depending on the receiver.
#[must_use]
pub fn receive_task(target: &str) -> String {
    format!("{target}-receive-task")
}

/// Event asking the tool owning `card_id` to show its settings.
#[must_use]
pub fn settings(card_id: &str) -> String {
    format!("{card_id}-settings")
}
