//! Tessera Runtime - Tool and card orchestration for one realm.
//!
//! This crate provides:
//! - [`InstanceStore`], the persisted map from tool name to descriptor
//! - [`Orchestrator`], which keeps the instance store, the live tool map and
//!   the card list in step and runs every lifecycle hook
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera_core::ToolName;
//! use tessera_runtime::Orchestrator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut realm = Orchestrator::builder("/home/user/notes").start().await?;
//!
//! let kanban = ToolName::new("kanban")?;
//! let card = realm.add_instance("board-1", &kanban, "📋").await?;
//! realm.toggle_instance(&card.id, &kanban).await?;
//! let outcome = realm.load_instance(&card.id, &kanban).await;
//! assert!(outcome.is_ok());
//!
//! realm.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod error;
pub mod orchestrator;
pub mod store;

pub use error::{RuntimeError, RuntimeResult};
pub use orchestrator::{InstallOutcome, Orchestrator, OrchestratorBuilder};
pub use store::{BUILTIN_VERSION, InstanceStore};
