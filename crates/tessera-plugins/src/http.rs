//! HTTP registry client.
//!
//! Plugins are published as plain files in a repository:
//! `<base>/<owner>/<repo>/main/{manifest.json, index.rhai, icon.svg}`.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use tessera_core::realm::{PLUGIN_ENTRY, PLUGIN_ICON, PLUGIN_MANIFEST};

use crate::error::{PluginError, PluginResult};
use crate::manifest::ToolManifest;
use crate::registry::{FetchedPlugin, RegistryClient, validate_repo};

/// Default registry base.
pub const DEFAULT_REGISTRY_URL: &str = "https://raw.githubusercontent.com";

/// Branch plugin files are read from.
const BRANCH: &str = "main";

/// Per-file download cap.
const MAX_DOWNLOAD_SIZE: u64 = 5 * 1024 * 1024;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`RegistryClient`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base: Url,
    max_download: u64,
}

impl HttpRegistryClient {
    /// Client for the default registry with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registry`] if the HTTP client cannot be built.
    pub fn new() -> PluginResult<Self> {
        Self::with_base(DEFAULT_REGISTRY_URL, DEFAULT_TIMEOUT)
    }

    /// Client for a custom registry base URL.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registry`] if `base` is not an http(s) URL or
    /// the HTTP client cannot be built.
    pub fn with_base(base: &str, timeout: Duration) -> PluginResult<Self> {
        let mut base = Url::parse(base).map_err(|e| PluginError::Registry {
            message: format!("invalid registry URL '{base}': {e}"),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(PluginError::Registry {
                message: format!("unsupported registry scheme '{}'", base.scheme()),
            });
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("tessera/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .build()
            .map_err(|e| PluginError::Registry {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base,
            max_download: MAX_DOWNLOAD_SIZE,
        })
    }

    /// Override the per-file download cap.
    #[must_use]
    pub fn with_max_download(mut self, bytes: u64) -> Self {
        self.max_download = bytes;
        self
    }

    /// URL of one published file.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidRepo`] for malformed repositories.
    pub fn file_url(&self, repo: &str, file: &str) -> PluginResult<Url> {
        validate_repo(repo)?;
        self.base
            .join(&format!("{repo}/{BRANCH}/{file}"))
            .map_err(|e| PluginError::Registry {
                message: format!("cannot build URL for {repo}/{file}: {e}"),
            })
    }

    /// Download a file. `Ok(None)` on 404.
    async fn get(&self, repo: &str, file: &str) -> PluginResult<Option<Vec<u8>>> {
        let url = self.file_url(repo, file)?;
        debug!(url = %url, "Fetching plugin file");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PluginError::Registry {
                message: format!("request to {url} failed: {e}"),
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(PluginError::Registry {
                message: format!("{url} returned {}", response.status()),
            });
        }
        if let Some(len) = response.content_length()
            && len > self.max_download
        {
            return Err(PluginError::PackageTooLarge {
                size: len,
                limit: self.max_download,
            });
        }

        download_with_limit(response, self.max_download)
            .await
            .map(Some)
    }

    async fn require(&self, repo: &str, file: &str) -> PluginResult<Vec<u8>> {
        self.get(repo, file)
            .await?
            .ok_or_else(|| PluginError::Registry {
                message: format!("{repo} does not publish {file}"),
            })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn fetch(&self, repo: &str) -> PluginResult<FetchedPlugin> {
        let manifest = ToolManifest::parse(&self.require(repo, PLUGIN_MANIFEST).await?)?;
        let source = String::from_utf8(self.require(repo, PLUGIN_ENTRY).await?).map_err(|_| {
            PluginError::Registry {
                message: format!("{repo}/{PLUGIN_ENTRY} is not valid UTF-8"),
            }
        })?;
        let icon = self.get(repo, PLUGIN_ICON).await?;
        Ok(FetchedPlugin {
            manifest,
            source,
            icon,
        })
    }
}

/// Download a response body with a size limit.
async fn download_with_limit(response: reqwest::Response, max_size: u64) -> PluginResult<Vec<u8>> {
    let capacity =
        usize::try_from(response.content_length().unwrap_or(0).min(max_size)).unwrap_or(0);
    let mut bytes = Vec::with_capacity(capacity);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| PluginError::Registry {
            message: format!("download error: {e}"),
        })?;
        bytes.extend_from_slice(&chunk);
        let current_size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        if current_size > max_size {
            return Err(PluginError::PackageTooLarge {
                size: current_size,
                limit: max_size,
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_urls() {
        let client = HttpRegistryClient::new().unwrap();
        assert_eq!(
            client.file_url("hollow/pomodoro", "manifest.json").unwrap().as_str(),
            "https://raw.githubusercontent.com/hollow/pomodoro/main/manifest.json"
        );

        let mirror =
            HttpRegistryClient::with_base("http://localhost:8080/mirror", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            mirror.file_url("a/b", "index.rhai").unwrap().as_str(),
            "http://localhost:8080/mirror/a/b/main/index.rhai"
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(HttpRegistryClient::with_base("ftp://example.com", DEFAULT_TIMEOUT).is_err());
        assert!(HttpRegistryClient::with_base("not a url", DEFAULT_TIMEOUT).is_err());

        let client = HttpRegistryClient::new().unwrap();
        assert!(matches!(
            client.file_url("../../etc", "passwd"),
            Err(PluginError::InvalidRepo(_))
        ));
    }
}
