//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_events::prelude::*;` to import all essential types.

pub use crate::topics;
pub use crate::{AsyncReply, Channel, ChannelError, ChannelResult, SubscriptionId};
