//! Tessera Core - Foundation types shared by every Tessera crate.
//!
//! This crate provides:
//! - Identifiers for tools and cards
//! - The persisted model: [`ToolDescriptor`] and [`CardRecord`]
//! - [`HookOutcome`], the uniform result of every lifecycle hook
//! - [`Realm`], the on-disk layout of one workspace
//! - [`RealmFs`], the filesystem collaborator used for card directories

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod error;
pub mod fs;
pub mod ids;
pub mod model;
pub mod outcome;
pub mod realm;

pub use error::{CoreError, CoreResult};
pub use fs::{LocalRealmFs, RealmFs, validate_component, validate_relative};
pub use ids::{CardId, ToolName};
pub use model::{CardRecord, ToolDescriptor, ToolMetadata};
pub use outcome::HookOutcome;
pub use realm::Realm;
