//! Tessera Events - Per-tool publish/subscribe channels.
//!
//! This crate provides:
//! - [`Channel`], the bus every tool owns and the host shares for global events
//! - A last-value cache per event name, readable without emitting
//! - Synchronous fan-out plus a distinct awaited variant for call/response
//! - Well-known event names in [`topics`]
//!
//! # Architecture
//!
//! A channel maps each event name to the most recent payload and an ordered
//! list of subscribers. There are three kinds of subscriber:
//!
//! 1. **Listeners** (`on`) observe a payload and return nothing.
//! 2. **Responders** (`on_request`) may return a reply synchronously.
//! 3. **Async responders** (`on_async`) return a future whose output becomes
//!    the reply of [`Channel::emit_async`].
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tessera_events::Channel;
//!
//! let channel = Channel::new("kanban");
//! channel.on("metadata", |payload| println!("cards: {payload}"));
//! channel.emit("metadata", json!({ "cards": [] }));
//!
//! assert_eq!(channel.get_data("metadata"), Some(json!({ "cards": [] })));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;
pub mod topics;

mod channel;
mod error;

pub use channel::{AsyncReply, Channel, SubscriptionId};
pub use error::{ChannelError, ChannelResult};
