//! Image and embed cards.

use serde_json::{Value, json};
use tracing::debug;

use tessera_core::CardRecord;
use tessera_events::topics;

use super::{Listener, SurfaceEnv, SurfaceKind};

pub(super) struct Image;

impl SurfaceKind for Image {
    const LABEL: &'static str = "image";

    fn initial(&self, _card: &CardRecord) -> Value {
        json!({
            "url": "",
            "caption": "",
            "alt": "",
            "objectFit": "contain",
            "position": { "x": 50, "y": 50 },
        })
    }
}

pub(super) struct Embed;

impl SurfaceKind for Embed {
    const LABEL: &'static str = "embed";

    fn initial(&self, _card: &CardRecord) -> Value {
        json!({ "src": "" })
    }

    /// Forward settings requests for this card to the host shell.
    fn listen(&self, card: &CardRecord, env: &SurfaceEnv) -> Vec<Listener> {
        let event = topics::settings(card.id.as_str());
        let host = env.host.clone();
        let tool = env.tool.clone();
        let card_id = card.id.clone();

        let id = env.channel.on(&event, move |payload| {
            debug!(tool = %tool, card_id = %card_id, "Forwarding settings request");
            host.emit(
                topics::TOOL_SETTINGS,
                json!({
                    "tool": tool,
                    "cardId": card_id,
                    "request": payload,
                }),
            );
        });

        vec![Listener::new(&env.channel, event, id)]
    }
}
