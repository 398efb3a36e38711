//! Kanban column.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use tessera_core::CardRecord;
use tessera_events::topics;

use super::{Listener, SurfaceEnv, SurfaceKind};

/// Item limit of a new column.
pub const DEFAULT_COLUMN_MAX: u64 = 10;
/// Accent colour of a new column.
pub const DEFAULT_COLUMN_ACCENT: &str = "#278ee9";

pub(super) struct Kanban;

impl SurfaceKind for Kanban {
    const LABEL: &'static str = "kanban column";

    fn initial(&self, card: &CardRecord) -> Value {
        json!({
            "id": card.id,
            "name": card.name,
            "items": [],
            "max": DEFAULT_COLUMN_MAX,
            "accent": DEFAULT_COLUMN_ACCENT,
        })
    }

    /// Accept tasks transferred to this column by name.
    fn listen(&self, card: &CardRecord, env: &SurfaceEnv) -> Vec<Listener> {
        let event = topics::receive_task(&card.name);
        let store = Arc::clone(&env.store);
        let channel = env.channel.clone();
        let tool = env.tool.clone();
        let card_id = card.id.clone();

        let id = env.channel.on_async(&event, move |payload| {
            let store = Arc::clone(&store);
            let channel = channel.clone();
            let tool = tool.clone();
            let card_id = card_id.clone();
            async move {
                let incoming = match payload {
                    Value::Array(items) => items,
                    Value::Null => Vec::new(),
                    item => vec![item],
                };
                let mut column = store
                    .get(card_id.as_str())
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| format!("no column stored for {card_id}"))?;
                let Some(items) = column.get_mut("items").and_then(Value::as_array_mut) else {
                    warn!(tool = %tool, card_id = %card_id, "Stored column has no item list");
                    return Err("malformed column".to_string());
                };
                let received = incoming.len();
                items.extend(incoming);
                store
                    .set(card_id.as_str(), column.clone())
                    .await
                    .map_err(|e| e.to_string())?;
                channel.emit(card_id.as_str(), column);
                debug!(tool = %tool, card_id = %card_id, received, "Tasks received");
                Ok::<_, String>(Some(json!({ "received": received })))
            }
        });

        vec![Listener::new(&env.channel, event, id)]
    }
}
