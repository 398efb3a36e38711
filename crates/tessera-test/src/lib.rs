//! Tessera Test - Shared test utilities for the Tessera workspace.
//!
//! Mock collaborators and fixtures used by the runtime and integration
//! tests as a dev-dependency:
//!
//! - [`RecordingPlugin`] logs every lifecycle hook and metadata broadcast
//! - [`MockRegistry`] serves canned plugins
//! - [`RecordingRealmFs`] is an in-memory realm filesystem that logs writes
//! - [`TestRealm`] roots a realm in a temporary directory
//!
//! ```rust,ignore
//! use tessera_test::prelude::*;
//!
//! let recorder = Recorder::new();
//! let factory = RecordingPlugin::new(recorder.clone()).factory();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
