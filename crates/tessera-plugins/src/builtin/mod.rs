//! Built-in tools.
//!
//! The set is closed: [`BuiltinTool`] names every tool compiled into the
//! application. All of them share one shape, implemented by
//! [`BuiltinPlugin`]: a card's content lives in the tool's private store under
//! the card id, `on_load` publishes it on the tool channel under the card id
//! (the card's headless "surface") and wires card-scoped listeners, and
//! `on_unload` tears both down again. Each tool only supplies its initial
//! content and its listeners through [`SurfaceKind`].

mod kanban;
mod media;
mod notebook;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use tessera_core::{CardId, CardRecord, HookOutcome, ToolName};
use tessera_events::{Channel, SubscriptionId};
use tessera_storage::KvStore;

use crate::error::{PluginError, PluginResult};
use crate::plugin::{Plugin, PluginContext};

pub use kanban::{DEFAULT_COLUMN_ACCENT, DEFAULT_COLUMN_MAX};
pub use notebook::DEFAULT_NOTE_STRUCTURE;

use kanban::Kanban;
use media::{Embed, Image};
use notebook::Notebook;

/// A tool compiled into the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    /// Kanban column.
    Kanban,
    /// Markdown notebook.
    Notebook,
    /// Single image.
    Image,
    /// Embedded web page.
    Embed,
}

impl BuiltinTool {
    /// Every built-in tool, in default store order.
    pub const ALL: [Self; 4] = [Self::Kanban, Self::Notebook, Self::Image, Self::Embed];

    /// Look up a built-in by tool name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Canonical tool name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Kanban => "kanban",
            Self::Notebook => "notebook",
            Self::Image => "image",
            Self::Embed => "embed",
        }
    }

    /// Tool name as a [`ToolName`].
    #[must_use]
    pub fn tool_name(self) -> ToolName {
        ToolName::from_static(self.name())
    }

    /// Build the plugin for this tool.
    #[must_use]
    pub fn instantiate(self, ctx: &PluginContext) -> Box<dyn Plugin> {
        match self {
            Self::Kanban => Box::new(BuiltinPlugin::new(Kanban, ctx)),
            Self::Notebook => Box::new(BuiltinPlugin::new(Notebook, ctx)),
            Self::Image => Box::new(BuiltinPlugin::new(Image, ctx)),
            Self::Embed => Box::new(BuiltinPlugin::new(Embed, ctx)),
        }
    }
}

impl fmt::Display for BuiltinTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BuiltinTool {
    type Err = PluginError;

    fn from_str(s: &str) -> PluginResult<Self> {
        Self::from_name(s).ok_or_else(|| PluginError::UnknownBuiltin(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Surface plumbing
// ---------------------------------------------------------------------------

/// What a built-in can reach while wiring a card's listeners.
#[derive(Clone)]
pub(crate) struct SurfaceEnv {
    pub(crate) tool: ToolName,
    pub(crate) host: Channel,
    pub(crate) channel: Channel,
    pub(crate) store: Arc<dyn KvStore>,
}

/// A card-scoped subscription to drop on unload.
pub(crate) struct Listener {
    channel: Channel,
    event: String,
    id: SubscriptionId,
}

impl Listener {
    pub(crate) fn new(channel: &Channel, event: impl Into<String>, id: SubscriptionId) -> Self {
        Self {
            channel: channel.clone(),
            event: event.into(),
            id,
        }
    }

    fn dispose(self) {
        self.channel.off(&self.event, self.id);
    }
}

/// Per-tool behaviour of a built-in.
pub(crate) trait SurfaceKind: Send + Sync + 'static {
    /// Verb used in failure messages, e.g. "kanban column".
    const LABEL: &'static str;

    /// Content stored for a freshly created card.
    fn initial(&self, card: &CardRecord) -> Value;

    /// Subscribe card-scoped listeners. Called on every load.
    fn listen(&self, _card: &CardRecord, _env: &SurfaceEnv) -> Vec<Listener> {
        Vec::new()
    }
}

/// Generic built-in plugin over a [`SurfaceKind`].
pub(crate) struct BuiltinPlugin<K> {
    kind: K,
    env: SurfaceEnv,
    mounted: HashMap<CardId, Vec<Listener>>,
}

impl<K: SurfaceKind> BuiltinPlugin<K> {
    fn new(kind: K, ctx: &PluginContext) -> Self {
        Self {
            kind,
            env: SurfaceEnv {
                tool: ctx.tool.clone(),
                host: ctx.host.clone(),
                channel: ctx.channel.clone(),
                store: Arc::clone(&ctx.config),
            },
            mounted: HashMap::new(),
        }
    }

    fn unmount(&mut self, id: &CardId) -> bool {
        let Some(listeners) = self.mounted.remove(id) else {
            return false;
        };
        for listener in listeners {
            listener.dispose();
        }
        self.env.channel.clear(id.as_str());
        true
    }
}

#[async_trait]
impl<K: SurfaceKind> Plugin for BuiltinPlugin<K> {
    async fn on_create(&mut self, card: &CardRecord) -> HookOutcome {
        match self.env.store.get(card.id.as_str()).await {
            // Retried create keeps the existing content.
            Ok(Some(_)) => HookOutcome::ok(),
            Ok(None) => match self
                .env
                .store
                .set(card.id.as_str(), self.kind.initial(card))
                .await
            {
                Ok(()) => HookOutcome::ok(),
                Err(e) => HookOutcome::error(format!("Failed to create {}", K::LABEL), e),
            },
            Err(e) => HookOutcome::error(format!("Failed to create {}", K::LABEL), e),
        }
    }

    async fn on_delete(&mut self, card: &CardRecord) -> HookOutcome {
        match self.env.store.remove(card.id.as_str()).await {
            Ok(_) => HookOutcome::ok(),
            Err(e) => HookOutcome::error(format!("Failed to delete {}", K::LABEL), e),
        }
    }

    async fn on_load(&mut self, card: &CardRecord) -> HookOutcome {
        let content = match self.env.store.get(card.id.as_str()).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                warn!(tool = %self.env.tool, card_id = %card.id, "No stored content, reinitialising");
                let content = self.kind.initial(card);
                if let Err(e) = self.env.store.set(card.id.as_str(), content.clone()).await {
                    return HookOutcome::error(format!("Failed to load {}", K::LABEL), e);
                }
                content
            },
            Err(e) => return HookOutcome::error(format!("Failed to load {}", K::LABEL), e),
        };

        self.unmount(&card.id);
        let listeners = self.kind.listen(card, &self.env);
        self.env.channel.emit(card.id.as_str(), content);
        self.mounted.insert(card.id.clone(), listeners);
        debug!(tool = %self.env.tool, card_id = %card.id, "Surface mounted");
        HookOutcome::ok()
    }

    async fn on_unload(&mut self, card_id: &CardId) -> HookOutcome {
        if self.unmount(card_id) {
            debug!(tool = %self.env.tool, card_id = %card_id, "Surface unmounted");
        }
        HookOutcome::ok()
    }
}
