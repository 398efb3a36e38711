//! Test harness helpers.

use std::path::Path;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use tessera_core::Realm;

/// Create a temporary directory for testing.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Set up test logging at `warn`.
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}

/// A realm rooted in a temporary directory that lives as long as the value.
#[derive(Debug)]
pub struct TestRealm {
    dir: TempDir,
    realm: Realm,
}

impl TestRealm {
    /// Create an empty realm.
    #[must_use]
    pub fn new() -> Self {
        let dir = test_dir();
        let realm = Realm::new(dir.path());
        Self { dir, realm }
    }

    /// Realm root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The realm layout.
    #[must_use]
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Whether `relative` exists below the root.
    #[must_use]
    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.dir.path().join(relative).exists()
    }

    /// Write a file below the root, creating parents.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&path, contents).expect("Failed to write file");
    }
}

impl Default for TestRealm {
    fn default() -> Self {
        Self::new()
    }
}
