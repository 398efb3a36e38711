//! Live plugin handle and per-card lifecycle enforcement.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, warn};

use tessera_core::{CardId, CardRecord, HookOutcome, ToolName};
use tessera_events::Channel;
use tessera_storage::KvStore;

use crate::plugin::{Plugin, PluginContext, PluginOrigin};

/// How many deleted ids a handle remembers. Older ones read as unregistered.
const DELETED_MEMORY: usize = 256;

/// Lifecycle position of one card within its handle.
///
/// A card with no entry is unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    /// `on_create` succeeded (or the card was adopted from storage).
    Created,
    /// `on_load` succeeded and `on_unload` has not run since.
    Loaded,
    /// `on_delete` ran. Terminal for as long as the handle remembers the id.
    Deleted,
}

/// The loaded counterpart of a tool descriptor.
///
/// Owns the plugin, the tool channel and the private config store. Every
/// hook call goes through the handle, which enforces
/// `Unregistered -> Created <-> Loaded`, `Created -> Deleted` and wraps the
/// result so callers always receive a [`HookOutcome`].
pub struct PluginHandle {
    tool: ToolName,
    origin: PluginOrigin,
    plugin: Box<dyn Plugin>,
    channel: Channel,
    config: Arc<dyn KvStore>,
    states: HashMap<CardId, CardState>,
    deleted: VecDeque<CardId>,
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("tool", &self.tool)
            .field("origin", &self.origin)
            .field("cards", &self.states.len())
            .field("deleted", &self.deleted.len())
            .finish_non_exhaustive()
    }
}

impl PluginHandle {
    /// Wrap a plugin built from `ctx`.
    #[must_use]
    pub fn new(ctx: &PluginContext, origin: PluginOrigin, plugin: Box<dyn Plugin>) -> Self {
        Self {
            tool: ctx.tool.clone(),
            origin,
            plugin,
            channel: ctx.channel.clone(),
            config: Arc::clone(&ctx.config),
            states: HashMap::new(),
            deleted: VecDeque::new(),
        }
    }

    /// Tool name.
    #[must_use]
    pub fn tool(&self) -> &ToolName {
        &self.tool
    }

    /// Where the plugin code came from.
    #[must_use]
    pub fn origin(&self) -> PluginOrigin {
        self.origin
    }

    /// The tool channel.
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// The private configuration store.
    #[must_use]
    pub fn config(&self) -> &Arc<dyn KvStore> {
        &self.config
    }

    /// Lifecycle state of a card, `None` if unregistered.
    #[must_use]
    pub fn state(&self, id: &CardId) -> Option<CardState> {
        self.states
            .get(id)
            .copied()
            .or_else(|| self.deleted.contains(id).then_some(CardState::Deleted))
    }

    /// Whether the card is currently loaded.
    #[must_use]
    pub fn is_loaded(&self, id: &CardId) -> bool {
        self.state(id) == Some(CardState::Loaded)
    }

    /// Ids of all loaded cards.
    #[must_use]
    pub fn loaded_cards(&self) -> Vec<CardId> {
        let mut ids: Vec<CardId> = self
            .states
            .iter()
            .filter(|(_, s)| **s == CardState::Loaded)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Mark cards persisted by an earlier session as created.
    pub fn adopt<'a>(&mut self, ids: impl IntoIterator<Item = &'a CardId>) {
        for id in ids {
            self.states.entry(id.clone()).or_insert(CardState::Created);
        }
    }

    /// Run `on_create`.
    pub async fn on_create(&mut self, card: &CardRecord) -> HookOutcome {
        match self.state(&card.id) {
            Some(CardState::Deleted) => {
                return self.refuse("on_create", &card.id, "card was already deleted");
            },
            Some(CardState::Created | CardState::Loaded) => {
                debug!(tool = %self.tool, card_id = %card.id, "Re-running on_create for existing card");
            },
            None => {},
        }

        let outcome = guarded(&self.tool, "on_create", &card.id, self.plugin.on_create(card)).await;
        if outcome.is_ok() {
            self.states.entry(card.id.clone()).or_insert(CardState::Created);
        }
        outcome
    }

    /// Run `on_load`. Only legal for created, unloaded cards; loading an
    /// already loaded card is a no-op success.
    pub async fn on_load(&mut self, card: &CardRecord) -> HookOutcome {
        match self.state(&card.id) {
            Some(CardState::Created) => {},
            Some(CardState::Loaded) => {
                return HookOutcome::ok().with_message("card is already loaded");
            },
            Some(CardState::Deleted) => {
                return self.refuse("on_load", &card.id, "card was deleted");
            },
            None => {
                return self.refuse("on_load", &card.id, "card was never created");
            },
        }

        let outcome = guarded(&self.tool, "on_load", &card.id, self.plugin.on_load(card)).await;
        if outcome.is_ok() {
            self.states.insert(card.id.clone(), CardState::Loaded);
        }
        outcome
    }

    /// Run `on_unload`. A card that is not loaded is a verified no-op: the
    /// plugin is not called and the result is success.
    pub async fn on_unload(&mut self, id: &CardId) -> HookOutcome {
        if !self.is_loaded(id) {
            debug!(tool = %self.tool, card_id = %id, "Unload of a card that is not loaded");
            return HookOutcome::ok();
        }

        let outcome = guarded(&self.tool, "on_unload", id, self.plugin.on_unload(id)).await;
        // Even a failed unload leaves the surface unusable; treat it as gone.
        self.states.insert(id.clone(), CardState::Created);
        outcome
    }

    /// Run `on_delete`. Refused while the card is loaded.
    ///
    /// The card leaves the live state map; only its id is kept, in a short
    /// list of recent deletions.
    pub async fn on_delete(&mut self, card: &CardRecord) -> HookOutcome {
        match self.state(&card.id) {
            Some(CardState::Loaded) => {
                error!(tool = %self.tool, card_id = %card.id, "on_delete requested while the card is loaded");
                return HookOutcome::failed("card must be unloaded before it is deleted");
            },
            Some(CardState::Deleted) => {
                return self.refuse("on_delete", &card.id, "card was already deleted");
            },
            Some(CardState::Created) | None => {},
        }

        let outcome = guarded(&self.tool, "on_delete", &card.id, self.plugin.on_delete(card)).await;
        self.states.remove(&card.id);
        if self.deleted.len() >= DELETED_MEMORY {
            self.deleted.pop_front();
        }
        self.deleted.push_back(card.id.clone());
        outcome
    }

    /// Unload every loaded card, logging failures.
    pub async fn unload_all(&mut self) {
        for id in self.loaded_cards() {
            let outcome = self.on_unload(&id).await;
            if !outcome.is_ok() {
                warn!(tool = %self.tool, card_id = %id, outcome = %outcome, "Unload failed during teardown");
            }
        }
    }

    /// Close the private configuration store.
    pub async fn close(&self) {
        if let Err(e) = self.config.close().await {
            warn!(tool = %self.tool, error = %e, "Failed to close tool config store");
        }
    }

    fn refuse(&self, hook: &'static str, id: &CardId, reason: &str) -> HookOutcome {
        warn!(tool = %self.tool, card_id = %id, hook, reason, "Hook refused");
        HookOutcome::failed(reason.to_string())
    }
}

/// Await a hook, converting a panic into a failed outcome and logging any
/// failure.
async fn guarded<F>(tool: &ToolName, hook: &'static str, id: &CardId, fut: F) -> HookOutcome
where
    F: Future<Output = HookOutcome> + Send,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => {
            if outcome.is_ok() {
                debug!(tool = %tool, card_id = %id, hook, "Hook succeeded");
            } else {
                warn!(tool = %tool, card_id = %id, hook, outcome = %outcome, "Hook reported failure");
            }
            outcome
        },
        Err(_) => {
            error!(tool = %tool, card_id = %id, hook, "Hook panicked");
            HookOutcome::failed(format!("{hook} panicked"))
        },
    }
}
