//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_core::prelude::*;` to import all essential types.

pub use crate::{CoreError, CoreResult};
pub use crate::{CardId, ToolName};
pub use crate::{CardRecord, HookOutcome, ToolDescriptor, ToolMetadata};
pub use crate::{LocalRealmFs, Realm, RealmFs};
