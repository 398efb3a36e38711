//! Remote plugin registry contract.

use async_trait::async_trait;

use crate::error::{PluginError, PluginResult};
use crate::manifest::ToolManifest;

/// A plugin fetched from the registry, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct FetchedPlugin {
    /// Parsed manifest.
    pub manifest: ToolManifest,
    /// Plugin source (`index.rhai`).
    pub source: String,
    /// Icon bytes, if the repository publishes one.
    pub icon: Option<Vec<u8>>,
}

/// Fetches plugin manifests, source and icons for install and update.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch everything needed to install `repo` (`owner/repo`).
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registry`] on network or HTTP failures,
    /// [`PluginError::ManifestParse`] if the manifest is malformed and
    /// [`PluginError::InvalidRepo`] if `repo` is not `owner/repo`.
    async fn fetch(&self, repo: &str) -> PluginResult<FetchedPlugin>;
}

/// Check that `repo` is a plain `owner/repo` reference.
///
/// # Errors
///
/// Returns [`PluginError::InvalidRepo`] otherwise.
pub fn validate_repo(repo: &str) -> PluginResult<()> {
    let invalid = || PluginError::InvalidRepo(repo.to_string());
    let (owner, name) = repo.split_once('/').ok_or_else(invalid)?;
    let valid_part = |part: &str| {
        !part.is_empty()
            && part != "."
            && part != ".."
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if valid_part(owner) && valid_part(name) {
        Ok(())
    } else {
        Err(invalid())
    }
}
