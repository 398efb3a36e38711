//! Persisted tool and card records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{CardId, ToolName};

/// Default width of a new card, in grid units.
pub const DEFAULT_CARD_WIDTH: u32 = 3;
/// Default height of a new card, in grid units.
pub const DEFAULT_CARD_HEIGHT: u32 = 4;

/// One placed-or-unplaced instance of a tool.
///
/// Geometry and style belong to the rendering layer; they are carried here
/// because persistence is record-granular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    /// Unique id across the whole application.
    pub id: CardId,
    /// Owning tool (weak reference).
    pub tool: ToolName,
    /// Display name, unique within the owning tool.
    pub name: String,
    /// Display emoji.
    pub emoji: String,
    /// Whether the card currently occupies canvas space.
    #[serde(default)]
    pub is_placed: bool,
    /// Whether the user starred the card.
    #[serde(default)]
    pub is_favored: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Horizontal grid position.
    #[serde(default)]
    pub x: i32,
    /// Vertical grid position.
    #[serde(default)]
    pub y: i32,
    /// Width in grid units.
    #[serde(default = "default_width")]
    pub w: u32,
    /// Height in grid units.
    #[serde(default = "default_height")]
    pub h: u32,
    /// Free-form style properties owned by the renderer.
    #[serde(default)]
    pub style: Map<String, Value>,
}

fn default_width() -> u32 {
    DEFAULT_CARD_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_CARD_HEIGHT
}

impl CardRecord {
    /// Build a fresh, unplaced card with a generated id and default geometry.
    #[must_use]
    pub fn new(tool: ToolName, name: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            id: CardId::generate(),
            tool,
            name: name.into(),
            emoji: emoji.into(),
            is_placed: false,
            is_favored: false,
            created_at: Utc::now(),
            x: 0,
            y: 0,
            w: DEFAULT_CARD_WIDTH,
            h: DEFAULT_CARD_HEIGHT,
            style: Map::new(),
        }
    }

    /// Override the id (fixtures and imports).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<CardId>) -> Self {
        self.id = id.into();
        self
    }

    /// Override the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Mark the card as placed or unplaced.
    #[must_use]
    pub fn placed(mut self, is_placed: bool) -> Self {
        self.is_placed = is_placed;
        self
    }
}

/// Persisted record of one installed tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Lower-cased unique name; also the store key.
    pub name: ToolName,
    /// Manifest version string.
    #[serde(default)]
    pub version: String,
    /// Trust flag. Only signed tools load unless unsigned loading is enabled.
    #[serde(default)]
    pub signed: bool,
    /// Icon reference (path relative to the realm, or a URL).
    #[serde(default)]
    pub icon: String,
    /// Every card of this tool.
    #[serde(default)]
    pub cards: Vec<CardRecord>,
    /// Registry repository the code was installed from. `None` for
    /// built-ins and for plugins found on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Additional manifest fields, passed through unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolDescriptor {
    /// Create a descriptor with no cards.
    #[must_use]
    pub fn new(name: ToolName, version: impl Into<String>) -> Self {
        Self {
            name,
            version: version.into(),
            signed: false,
            icon: String::new(),
            cards: Vec::new(),
            repo: None,
            extra: Map::new(),
        }
    }

    /// Set the trust flag.
    #[must_use]
    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Set the icon reference.
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Record the registry repository.
    #[must_use]
    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    /// Whether the code came from the registry rather than being built in
    /// or dropped on disk.
    #[must_use]
    pub fn is_downloaded(&self) -> bool {
        self.repo.is_some()
    }

    /// Replace the card list.
    #[must_use]
    pub fn with_cards(mut self, cards: Vec<CardRecord>) -> Self {
        self.cards = cards;
        self
    }

    /// Find a card by id.
    #[must_use]
    pub fn card(&self, id: &CardId) -> Option<&CardRecord> {
        self.cards.iter().find(|c| &c.id == id)
    }

    /// Metadata derived from the current card list.
    #[must_use]
    pub fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            cards: self.cards.clone(),
        }
    }
}

/// Broadcast-only view of a tool's cards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// The tool's cards, in instance-list order.
    pub cards: Vec<CardRecord>,
}

impl ToolMetadata {
    /// Metadata for the cards of `tool` found in `instances`.
    #[must_use]
    pub fn for_tool(tool: &ToolName, instances: &[CardRecord]) -> Self {
        Self {
            cards: instances
                .iter()
                .filter(|c| &c.tool == tool)
                .cloned()
                .collect(),
        }
    }

    /// JSON form published on the channel.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
