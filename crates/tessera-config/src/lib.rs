//! Tessera Config - Layered configuration for the Tessera workspace.
//!
//! ```rust,no_run
//! use tessera_config::Config;
//!
//! let config = Config::load(Some(std::path::Path::new("."))).unwrap();
//! println!("Registry: {}", config.registry.url);
//! ```
//!
//! # Precedence
//!
//! From highest to lowest:
//!
//! 1. **Realm** (`<realm>/.tessera/config.toml`)
//! 2. **User** (`~/.tessera/config.toml`)
//! 3. **Environment** (`TESSERA_REALM`, `TESSERA_LOG`,
//!    `TESSERA_REGISTRY_URL`), for fields no file sets
//! 4. **Embedded defaults** (`defaults.toml`)
//!
//! This crate has no dependencies on other tessera crates. Conversion into
//! runtime types happens at the binary.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment variable fallbacks.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the
    /// final configuration fails validation.
    pub fn load(realm_root: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(realm_root, None)
    }

    /// Load configuration with an explicit home directory.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with_home(
        realm_root: Option<&std::path::Path>,
        home_dir: &std::path::Path,
    ) -> ConfigResult<Self> {
        loader::load(realm_root, Some(home_dir))
    }
}
