//! Runtime error types.

use thiserror::Error;

use tessera_core::{CardId, CoreError, ToolName};
use tessera_events::ChannelError;
use tessera_plugins::PluginError;
use tessera_storage::StorageError;

/// Errors returned by orchestrator operations.
///
/// Hook failures are not errors; they are logged and reported as
/// [`HookOutcome`](tessera_core::HookOutcome) data.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A card with the same name already exists under the tool.
    #[error("A card with that name already exists")]
    DuplicateCardName {
        /// Owning tool.
        tool: ToolName,
        /// The rejected name.
        name: String,
    },

    /// The tool has no descriptor in the instance store.
    #[error("Tool not found: {0}")]
    ToolNotFound(ToolName),

    /// A fresh install targeted a tool that is already installed.
    #[error("Tool already installed: {0}")]
    ToolAlreadyInstalled(ToolName),

    /// The card is not part of the tool's instance list.
    #[error("Card not found: {card_id} in {tool}")]
    CardNotFound {
        /// Owning tool.
        tool: ToolName,
        /// The missing card.
        card_id: CardId,
    },

    /// Plugin loading or registry failure.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Instance store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Path or filesystem failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An async subscriber rejected a request.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl RuntimeError {
    /// Whether the message is meant for the person using the workspace,
    /// rather than for logs.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCardName { .. }
                | Self::ToolNotFound(_)
                | Self::ToolAlreadyInstalled(_)
                | Self::CardNotFound { .. }
        )
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
