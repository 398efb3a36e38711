//! Card-scoped filesystem.
//!
//! Each card owns `main/<tool>/<card>/` inside the realm. Tools reach it
//! through the `"card-fs"` event on their channel; the host answers with
//! [`serve`]. Requests look like:
//!
//! ```json
//! { "cardName": "board-1", "op": "writeFile", "path": "notes/a.md", "contents": "..." }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use tessera_core::{CoreError, Realm, ToolName, validate_relative};
use tessera_events::{Channel, SubscriptionId, topics};

use crate::error::PluginResult;

/// One entry of a card directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDirEntry {
    /// File or directory name.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// A card filesystem operation. Paths are relative to the card directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum CardFsOp {
    /// List a directory (the card root when `path` is absent).
    ReadDir {
        /// Directory to list.
        #[serde(default)]
        path: Option<String>,
    },
    /// Read a UTF-8 file.
    ReadFile {
        /// File to read.
        path: String,
    },
    /// Write a file, creating parent directories.
    WriteFile {
        /// File to write.
        path: String,
        /// New contents.
        contents: String,
    },
    /// Remove a file or a directory tree.
    Remove {
        /// Entry to remove.
        path: String,
    },
    /// Check whether an entry exists.
    Exists {
        /// Entry to check.
        path: String,
    },
    /// Create a directory and its parents.
    Mkdir {
        /// Directory to create.
        path: String,
    },
    /// Move an entry within the card directory.
    Rename {
        /// Current location.
        path: String,
        /// New location.
        to: String,
    },
}

/// Payload of a `"card-fs"` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardFsRequest {
    /// Card whose directory is addressed.
    pub card_name: String,
    /// Operation to run.
    #[serde(flatten)]
    pub op: CardFsOp,
}

/// Filesystem rooted at one card's directory.
#[derive(Debug, Clone)]
pub struct CardFs {
    root: PathBuf,
}

impl CardFs {
    /// Scope a filesystem to `main/<tool>/<card_name>/` of `realm`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPath`] if the card name is not a single,
    /// plain path component.
    pub fn new(realm: &Realm, tool: &ToolName, card_name: &str) -> PluginResult<Self> {
        let relative = Realm::card_dir(tool, card_name)?;
        Ok(Self {
            root: realm.resolve(&relative),
        })
    }

    /// Absolute card directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PluginResult<PathBuf> {
        Ok(self.root.join(validate_relative(path)?))
    }

    /// List a directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures.
    pub async fn read_dir(&self, path: &str) -> PluginResult<Vec<CardDirEntry>> {
        let dir = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&dir).await.map_err(io(&dir))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(io(&dir))? {
            let file_type = entry.file_type().await.map_err(io(&dir))?;
            entries.push(CardDirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Read a UTF-8 file.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures, including a
    /// missing file.
    pub async fn read_file(&self, path: &str) -> PluginResult<String> {
        let file = self.resolve(path)?;
        Ok(tokio::fs::read_to_string(&file).await.map_err(io(&file))?)
    }

    /// Write a file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures.
    pub async fn write_file(&self, path: &str, contents: &str) -> PluginResult<()> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io(parent))?;
        }
        tokio::fs::write(&file, contents).await.map_err(io(&file))?;
        Ok(())
    }

    /// Remove a file or a directory tree. Missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths, an attempt to remove the card
    /// root, or I/O failures.
    pub async fn remove(&self, path: &str) -> PluginResult<()> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(CoreError::InvalidPath {
                path: path.to_string(),
                reason: "refusing to remove the card directory".into(),
            }
            .into());
        }
        let metadata = match tokio::fs::symlink_metadata(&target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io(&target)(e).into()),
        };
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await.map_err(io(&target))?;
        } else {
            tokio::fs::remove_file(&target).await.map_err(io(&target))?;
        }
        Ok(())
    }

    /// Whether an entry exists.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures.
    pub async fn exists(&self, path: &str) -> PluginResult<bool> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await.map_err(io(&target))?)
    }

    /// Create a directory and its parents.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures.
    pub async fn mkdir(&self, path: &str) -> PluginResult<()> {
        let dir = self.resolve(path)?;
        tokio::fs::create_dir_all(&dir).await.map_err(io(&dir))?;
        Ok(())
    }

    /// Move an entry within the card directory.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid paths or I/O failures.
    pub async fn rename(&self, from: &str, to: &str) -> PluginResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io(parent))?;
        }
        tokio::fs::rename(&source, &target)
            .await
            .map_err(io(&source))?;
        Ok(())
    }

    /// Run one operation and encode its JSON reply.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying operation.
    pub async fn execute(&self, op: &CardFsOp) -> PluginResult<Value> {
        let reply = match op {
            CardFsOp::ReadDir { path } => {
                let entries = self.read_dir(path.as_deref().unwrap_or("")).await?;
                json!({ "ok": true, "entries": entries })
            },
            CardFsOp::ReadFile { path } => {
                json!({ "ok": true, "contents": self.read_file(path).await? })
            },
            CardFsOp::WriteFile { path, contents } => {
                self.write_file(path, contents).await?;
                json!({ "ok": true })
            },
            CardFsOp::Remove { path } => {
                self.remove(path).await?;
                json!({ "ok": true })
            },
            CardFsOp::Exists { path } => {
                json!({ "ok": true, "exists": self.exists(path).await? })
            },
            CardFsOp::Mkdir { path } => {
                self.mkdir(path).await?;
                json!({ "ok": true })
            },
            CardFsOp::Rename { path, to } => {
                self.rename(path, to).await?;
                json!({ "ok": true })
            },
        };
        Ok(reply)
    }
}

fn io(path: &Path) -> impl FnOnce(std::io::Error) -> CoreError + '_ {
    move |source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Answer `"card-fs"` requests on `channel` for the cards of `tool`.
///
/// Errors reach the requester through [`Channel::emit_async`].
pub fn serve(channel: &Channel, realm: &Realm, tool: &ToolName) -> SubscriptionId {
    let realm = realm.clone();
    let tool = tool.clone();
    channel.on_async(topics::CARD_FS, move |payload| {
        let realm = realm.clone();
        let tool = tool.clone();
        async move {
            let request: CardFsRequest = serde_json::from_value(payload)
                .map_err(|e| format!("invalid card-fs request: {e}"))?;
            debug!(tool = %tool, card = %request.card_name, op = ?request.op, "card-fs request");
            let fs = CardFs::new(&realm, &tool, &request.card_name).map_err(|e| e.to_string())?;
            let reply = fs.execute(&request.op).await.map_err(|e| e.to_string())?;
            Ok::<_, String>(Some(reply))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_fs(tmp: &tempfile::TempDir) -> CardFs {
        CardFs::new(
            &Realm::new(tmp.path()),
            &ToolName::from_static("notebook"),
            "journal",
        )
        .unwrap()
    }

    #[test]
    fn test_request_wire_shape() {
        let request: CardFsRequest = serde_json::from_value(json!({
            "cardName": "journal",
            "op": "rename",
            "path": "a.md",
            "to": "b.md"
        }))
        .unwrap();
        assert_eq!(
            request.op,
            CardFsOp::Rename {
                path: "a.md".into(),
                to: "b.md".into()
            }
        );

        let list: CardFsRequest =
            serde_json::from_value(json!({"cardName": "journal", "op": "readDir"})).unwrap();
        assert_eq!(list.op, CardFsOp::ReadDir { path: None });
    }

    #[tokio::test]
    async fn test_file_operations() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = card_fs(&tmp);
        assert!(fs.root().ends_with("main/notebook/journal"));

        fs.write_file("/notes/today.md", "# Today").await.unwrap();
        assert_eq!(fs.read_file("notes/today.md").await.unwrap(), "# Today");
        assert!(fs.exists("notes").await.unwrap());

        fs.mkdir("attachments").await.unwrap();
        let entries = fs.read_dir("").await.unwrap();
        assert_eq!(
            entries,
            vec![
                CardDirEntry {
                    name: "attachments".into(),
                    is_dir: true
                },
                CardDirEntry {
                    name: "notes".into(),
                    is_dir: true
                },
            ]
        );

        fs.rename("notes/today.md", "archive/today.md").await.unwrap();
        assert!(!fs.exists("notes/today.md").await.unwrap());
        assert!(fs.exists("archive/today.md").await.unwrap());

        fs.remove("archive").await.unwrap();
        fs.remove("archive").await.unwrap();
        assert!(!fs.exists("archive").await.unwrap());
    }

    #[tokio::test]
    async fn test_scope_cannot_be_escaped() {
        let tmp = tempfile::tempdir().unwrap();
        let realm = Realm::new(tmp.path());
        let tool = ToolName::from_static("notebook");

        assert!(CardFs::new(&realm, &tool, "..").is_err());
        assert!(CardFs::new(&realm, &tool, "a/b").is_err());

        let fs = card_fs(&tmp);
        assert!(fs.read_file("../other/secret").await.is_err());
        assert!(fs.write_file("x/../../y", "").await.is_err());
        assert!(fs.remove("").await.is_err());
    }

    #[tokio::test]
    async fn test_served_over_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let realm = Realm::new(tmp.path());
        let channel = Channel::new("notebook");
        serve(&channel, &realm, &ToolName::from_static("notebook"));

        let written = channel
            .emit_async(
                "card-fs",
                json!({"cardName": "journal", "op": "writeFile", "path": "a.md", "contents": "hi"}),
            )
            .await
            .unwrap();
        assert_eq!(written, Some(json!({"ok": true})));

        let read = channel
            .emit_async(
                "card-fs",
                json!({"cardName": "journal", "op": "readFile", "path": "a.md"}),
            )
            .await
            .unwrap();
        assert_eq!(read, Some(json!({"ok": true, "contents": "hi"})));

        let escaped = channel
            .emit_async(
                "card-fs",
                json!({"cardName": "..", "op": "readDir"}),
            )
            .await;
        assert!(escaped.is_err());
    }
}
