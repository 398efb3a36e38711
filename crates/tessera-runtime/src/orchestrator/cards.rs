//! Card operations.

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;
use tracing::{debug, info, warn};

use tessera_core::{CardId, CardRecord, HookOutcome, Realm, ToolName, validate_component};
use tessera_events::topics;

use super::Orchestrator;
use crate::error::{RuntimeError, RuntimeResult};

impl Orchestrator {
    /// Create a card under `tool`.
    ///
    /// The card is persisted before `on_create` runs. If the hook fails the
    /// card stays in the list without a directory; nothing is rolled back.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ToolNotFound`] if the tool is not installed
    /// - [`RuntimeError::DuplicateCardName`] if the tool already has a card
    ///   with that name
    /// - [`RuntimeError::Core`] if the name cannot be a directory name
    pub async fn add_instance(
        &mut self,
        name: &str,
        tool: &ToolName,
        emoji: &str,
    ) -> RuntimeResult<CardRecord> {
        if self.store.get(tool).await?.is_none() {
            return Err(RuntimeError::ToolNotFound(tool.clone()));
        }
        self.ensure_unique_name(tool, name, None)?;
        validate_component(name)?;

        let card = CardRecord::new(tool.clone(), name, emoji);
        self.instances.push(card.clone());
        self.persist(tool).await?;

        let outcome = match self.tools.get_mut(tool) {
            Some(handle) => handle.on_create(&card).await,
            None => HookOutcome::failed("tool is not loaded"),
        };
        if outcome.is_ok() {
            let dir = Realm::card_dir(tool, &card.name)?;
            if let Err(e) = self.fs.create_dir(&dir).await {
                warn!(tool = %tool, card_id = %card.id, error = %e, "Failed to create card directory");
            }
        } else {
            warn!(tool = %tool, card_id = %card.id, outcome = %outcome, "Card created without storage");
        }

        self.broadcast(tool);
        info!(tool = %tool, card_id = %card.id, name, "Card added");
        Ok(card)
    }

    /// Delete cards of `tool`. Loaded or placed cards are unloaded first.
    ///
    /// With `with_fs_cleanup` and exactly one card, its directory is removed
    /// too. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ToolNotFound`] if the tool is not installed.
    pub async fn remove_instance(
        &mut self,
        card_ids: &[CardId],
        tool: &ToolName,
        with_fs_cleanup: bool,
    ) -> RuntimeResult<()> {
        if self.store.get(tool).await?.is_none() {
            return Err(RuntimeError::ToolNotFound(tool.clone()));
        }
        let wanted: HashSet<&CardId> = card_ids.iter().collect();
        let (removed, kept): (Vec<CardRecord>, Vec<CardRecord>) = std::mem::take(&mut self.instances)
            .into_iter()
            .partition(|c| &c.tool == tool && wanted.contains(&c.id));
        self.instances = kept;
        if removed.len() < wanted.len() {
            debug!(tool = %tool, requested = wanted.len(), found = removed.len(), "Some cards were already gone");
        }
        self.persist(tool).await?;

        if let Some(handle) = self.tools.get_mut(tool) {
            for card in &removed {
                if card.is_placed || handle.is_loaded(&card.id) {
                    handle.on_unload(&card.id).await;
                }
                handle.on_delete(card).await;
            }
        } else {
            warn!(tool = %tool, "Removing cards of a tool that is not loaded, hooks skipped");
        }

        if with_fs_cleanup
            && let [card] = removed.as_slice()
        {
            let dir = Realm::card_dir(tool, &card.name)?;
            if let Err(e) = self.fs.remove_dir(&dir).await {
                warn!(tool = %tool, card_id = %card.id, error = %e, "Failed to remove card directory");
            }
        }

        self.broadcast(tool);
        info!(tool = %tool, count = removed.len(), "Cards removed");
        Ok(())
    }

    /// Place or unplace a card and return the new placement. Unplacing
    /// unloads the card first; placing runs no hook.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CardNotFound`] for an unknown card.
    pub async fn toggle_instance(&mut self, card_id: &CardId, tool: &ToolName) -> RuntimeResult<bool> {
        let index = self.position(tool, card_id)?;
        let was_placed = self.instances.get(index).is_some_and(|c| c.is_placed);

        if was_placed
            && let Some(handle) = self.tools.get_mut(tool)
        {
            handle.on_unload(card_id).await;
        }
        if let Some(card) = self.instances.get_mut(index) {
            card.is_placed = !was_placed;
        }
        self.persist(tool).await?;
        self.broadcast(tool);
        debug!(tool = %tool, card_id = %card_id, placed = !was_placed, "Card toggled");
        Ok(!was_placed)
    }

    /// Attach a placed card to its surface. Never fails: unknown tools,
    /// unknown cards and cards that are not placed come back as a failed
    /// outcome.
    pub async fn load_instance(&mut self, card_id: &CardId, tool: &ToolName) -> HookOutcome {
        let Some(card) = self.instance(tool, card_id).cloned() else {
            warn!(tool = %tool, card_id = %card_id, "Load requested for an unknown card");
            return HookOutcome::failed(format!("card {card_id} not found in {tool}"));
        };
        if !card.is_placed {
            warn!(tool = %tool, card_id = %card_id, "Load requested for a card that is not placed");
            return HookOutcome::failed(format!("card {card_id} is not placed"));
        }
        let Some(handle) = self.tools.get_mut(tool) else {
            warn!(tool = %tool, card_id = %card_id, "Load requested for a tool that is not loaded");
            return HookOutcome::failed(format!("tool {tool} is not loaded"));
        };
        handle.on_load(&card).await
    }

    /// Replace a card's record. The name and placement are kept; use
    /// [`rename_instance`](Self::rename_instance) and
    /// [`toggle_instance`](Self::toggle_instance) to change them.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CardNotFound`] for an unknown card.
    pub async fn update_instance(&mut self, card: CardRecord) -> RuntimeResult<()> {
        let tool = card.tool.clone();
        self.apply_update(card)?;
        self.persist(&tool).await?;
        self.broadcast(&tool);
        Ok(())
    }

    /// Replace several records at once, persisting each affected tool once.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CardNotFound`] if any card is unknown. The
    /// check happens before anything changes.
    pub async fn update_instances(&mut self, cards: Vec<CardRecord>) -> RuntimeResult<()> {
        for card in &cards {
            self.position(&card.tool, &card.id)?;
        }
        let tools: BTreeSet<ToolName> = cards.iter().map(|c| c.tool.clone()).collect();
        for card in cards {
            self.apply_update(card)?;
        }
        for tool in &tools {
            self.persist(tool).await?;
            self.broadcast(tool);
        }
        Ok(())
    }

    /// Set a card's emoji.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CardNotFound`] for an unknown card.
    pub async fn change_emoji(
        &mut self,
        emoji: &str,
        card_id: &CardId,
        tool: &ToolName,
    ) -> RuntimeResult<()> {
        let index = self.position(tool, card_id)?;
        if let Some(card) = self.instances.get_mut(index) {
            card.emoji = emoji.to_string();
        }
        self.persist(tool).await?;
        self.broadcast(tool);
        Ok(())
    }

    /// Star or unstar a card and return the new state.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CardNotFound`] for an unknown card.
    pub async fn toggle_favourite(&mut self, card_id: &CardId, tool: &ToolName) -> RuntimeResult<bool> {
        let index = self.position(tool, card_id)?;
        let mut favored = false;
        if let Some(card) = self.instances.get_mut(index) {
            card.is_favored = !card.is_favored;
            favored = card.is_favored;
        }
        self.persist(tool).await?;
        self.broadcast(tool);
        Ok(favored)
    }

    /// Rename a card and move its directory.
    ///
    /// A loaded card is unloaded before and reloaded after the move, so
    /// listeners keyed by the card name follow it.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::CardNotFound`] for an unknown card
    /// - [`RuntimeError::DuplicateCardName`] if the name is taken
    /// - [`RuntimeError::Core`] if the name cannot be a directory name
    pub async fn rename_instance(
        &mut self,
        card_id: &CardId,
        tool: &ToolName,
        new_name: &str,
    ) -> RuntimeResult<()> {
        let index = self.position(tool, card_id)?;
        self.ensure_unique_name(tool, new_name, Some(card_id))?;
        validate_component(new_name)?;

        let Some(old_name) = self.instances.get(index).map(|c| c.name.clone()) else {
            return Err(RuntimeError::CardNotFound {
                tool: tool.clone(),
                card_id: card_id.clone(),
            });
        };
        if old_name == new_name {
            return Ok(());
        }

        let was_loaded = match self.tools.get_mut(tool) {
            Some(handle) if handle.is_loaded(card_id) => {
                handle.on_unload(card_id).await;
                true
            },
            _ => false,
        };

        if let Some(card) = self.instances.get_mut(index) {
            card.name = new_name.to_string();
        }
        self.persist(tool).await?;

        let from = Realm::card_dir(tool, &old_name)?;
        let to = Realm::card_dir(tool, new_name)?;
        if let Err(e) = self.fs.rename(&from, &to).await {
            warn!(tool = %tool, card_id = %card_id, error = %e, "Failed to move card directory");
        }

        if was_loaded
            && let Some(card) = self.instances.get(index).cloned()
            && let Some(handle) = self.tools.get_mut(tool)
        {
            handle.on_load(&card).await;
        }

        self.broadcast(tool);
        info!(tool = %tool, card_id = %card_id, from = %old_name, to = new_name, "Card renamed");
        Ok(())
    }

    /// Ask a card to open its settings by emitting `"<cardId>-settings"`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CardNotFound`] for an unknown card and
    /// [`RuntimeError::ToolNotFound`] if the tool is not loaded.
    pub fn request_settings(&self, card_id: &CardId, tool: &ToolName) -> RuntimeResult<()> {
        self.position(tool, card_id)?;
        let channel = self
            .tools
            .channel(tool)
            .ok_or_else(|| RuntimeError::ToolNotFound(tool.clone()))?;
        channel.emit(&topics::settings(card_id.as_str()), Value::Bool(true));
        Ok(())
    }

    /// Hand items to the card named `card_name` via `"<cardName>-receive-task"`
    /// and return the receiver's reply, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ToolNotFound`] if the tool is not loaded and
    /// [`RuntimeError::Channel`] if the receiver rejects the items.
    pub async fn transfer_tasks(
        &self,
        tool: &ToolName,
        card_name: &str,
        items: Value,
    ) -> RuntimeResult<Option<Value>> {
        let channel = self
            .tools
            .channel(tool)
            .ok_or_else(|| RuntimeError::ToolNotFound(tool.clone()))?;
        let reply = channel.emit_async(&topics::receive_task(card_name), items).await?;
        if reply.is_none() {
            debug!(tool = %tool, card_name, "No card is listening for tasks");
        }
        Ok(reply)
    }

    fn apply_update(&mut self, card: CardRecord) -> RuntimeResult<()> {
        let index = self.position(&card.tool, &card.id)?;
        if let Some(slot) = self.instances.get_mut(index) {
            if slot.name != card.name {
                debug!(tool = %card.tool, card_id = %card.id, "Ignoring name change in update");
            }
            if slot.is_placed != card.is_placed {
                debug!(tool = %card.tool, card_id = %card.id, "Ignoring placement change in update");
            }
            let name = std::mem::take(&mut slot.name);
            let created_at = slot.created_at;
            let is_placed = slot.is_placed;
            *slot = CardRecord {
                name,
                created_at,
                is_placed,
                ..card
            };
        }
        Ok(())
    }
}
