//! Tessera Storage - Key/value stores backing tool descriptors and tool
//! configuration.
//!
//! Two backends implement [`KvStore`]:
//!
//! - [`MemoryKvStore`]: ephemeral, for tests and scratch state
//! - [`JsonFileStore`]: a single pretty-printed JSON object on disk,
//!   rewritten atomically on every mutation
//!
//! Both refuse every operation after [`KvStore::close`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod file;
mod kv;

pub use error::{StorageError, StorageResult};
pub use file::JsonFileStore;
pub use kv::{KvStore, KvStoreExt, MemoryKvStore, validate_key};
