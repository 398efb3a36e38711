//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tessera_runtime::prelude::*;` to import all essential types.

pub use crate::{InstallOutcome, InstanceStore, Orchestrator, OrchestratorBuilder};
pub use crate::{RuntimeError, RuntimeResult};
