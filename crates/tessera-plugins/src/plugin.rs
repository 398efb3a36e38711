//! Plugin trait and the context every plugin is built with.

use std::sync::Arc;

use async_trait::async_trait;

use tessera_core::{CardId, CardRecord, HookOutcome, ToolName};
use tessera_events::Channel;
use tessera_storage::KvStore;

/// Where a plugin's code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOrigin {
    /// Compiled into the application.
    Builtin,
    /// Downloaded source evaluated by the script engine.
    Script,
    /// Supplied directly by the embedding application (tests, hosts).
    Native,
}

/// Everything a plugin receives at construction.
///
/// The two channels are the only way a plugin talks to anything else.
#[derive(Clone)]
pub struct PluginContext {
    /// Tool this plugin implements.
    pub tool: ToolName,
    /// Host application channel for global events.
    pub host: Channel,
    /// This tool's own channel.
    pub channel: Channel,
    /// Private configuration store at `main/<tool>/config.json`.
    pub config: Arc<dyn KvStore>,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("tool", &self.tool)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// A tool implementation: exactly four lifecycle hooks.
///
/// Hooks report failure as a [`HookOutcome`] with `status: false`; a panic is
/// caught by the owning [`PluginHandle`](crate::PluginHandle) and converted
/// the same way. Ordering between hooks is enforced by the handle, so
/// implementors may assume e.g. that `on_load` only follows `on_create`.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Allocate tool-private storage for a new card. Must tolerate retries.
    async fn on_create(&mut self, card: &CardRecord) -> HookOutcome;

    /// Release the card's storage permanently.
    async fn on_delete(&mut self, card: &CardRecord) -> HookOutcome;

    /// Attach the card's content to its live surface.
    async fn on_load(&mut self, card: &CardRecord) -> HookOutcome;

    /// Detach the card's surface and dispose card-scoped listeners.
    async fn on_unload(&mut self, card_id: &CardId) -> HookOutcome;
}
