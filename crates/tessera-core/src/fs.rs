//! Filesystem collaborator scoped to a realm root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Validate a single path component such as a card name.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPath`] if the component is empty, `.`/`..`,
/// or contains a separator or a null byte.
pub fn validate_component(component: &str) -> CoreResult<()> {
    let invalid = |reason: &str| CoreError::InvalidPath {
        path: component.to_string(),
        reason: reason.to_string(),
    };
    if component.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if component == "." || component == ".." {
        return Err(invalid("must not be a relative directory marker"));
    }
    if component.contains(['/', '\\', '\0']) {
        return Err(invalid("must not contain separators or null bytes"));
    }
    Ok(())
}

/// Normalise a relative path and make sure it stays below its root.
///
/// Leading slashes are stripped, so `"/notes/a.md"` means `notes/a.md`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidPath`] for `..` components, drive prefixes,
/// or null bytes.
pub fn validate_relative(path: &str) -> CoreResult<PathBuf> {
    let invalid = |reason: &str| CoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.contains('\0') {
        return Err(invalid("must not contain null bytes"));
    }
    let trimmed = path.trim_start_matches(['/', '\\']);
    let mut clean = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {},
            Component::ParentDir => return Err(invalid("must not contain '..'")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("must be relative"));
            },
        }
    }
    Ok(clean)
}

/// Directory operations the orchestrator issues against the realm.
///
/// Paths are relative to the realm root.
#[async_trait]
pub trait RealmFs: Send + Sync {
    /// Create a directory and its parents.
    async fn create_dir(&self, relative: &Path) -> CoreResult<()>;

    /// Remove a directory tree. Missing directories are not an error.
    async fn remove_dir(&self, relative: &Path) -> CoreResult<()>;

    /// Write a file, creating parent directories.
    async fn write_file(&self, relative: &Path, contents: &[u8]) -> CoreResult<()>;

    /// Read a UTF-8 file. Returns `None` if it does not exist.
    async fn read_to_string(&self, relative: &Path) -> CoreResult<Option<String>>;

    /// Names of the sub-directories of a directory. Missing directory yields
    /// an empty list.
    async fn list_dirs(&self, relative: &Path) -> CoreResult<Vec<String>>;

    /// Move a file or directory. A missing source is not an error.
    async fn rename(&self, from: &Path, to: &Path) -> CoreResult<()>;
}

/// [`RealmFs`] backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalRealmFs {
    root: PathBuf,
}

impl LocalRealmFs {
    /// Create a filesystem rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative: &Path) -> CoreResult<PathBuf> {
        let as_str = relative.to_string_lossy();
        let clean = validate_relative(&as_str)?;
        Ok(self.root.join(clean))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CoreError + '_ {
    move |source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl RealmFs for LocalRealmFs {
    async fn create_dir(&self, relative: &Path) -> CoreResult<()> {
        let path = self.resolve(relative)?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(io_error(&path))?;
        debug!(path = %path.display(), "Created directory");
        Ok(())
    }

    async fn remove_dir(&self, relative: &Path) -> CoreResult<()> {
        let path = self.resolve(relative)?;
        if path == self.root {
            return Err(CoreError::InvalidPath {
                path: relative.display().to_string(),
                reason: "refusing to remove the realm root".into(),
            });
        }
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed directory");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    async fn write_file(&self, relative: &Path, contents: &[u8]) -> CoreResult<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(io_error(&path))
    }

    async fn read_to_string(&self, relative: &Path) -> CoreResult<Option<String>> {
        let path = self.resolve(relative)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    async fn list_dirs(&self, relative: &Path) -> CoreResult<Vec<String>> {
        let path = self.resolve(relative)?;
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&path)(e)),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&path))? {
            let file_type = entry.file_type().await.map_err(io_error(&path))?;
            if file_type.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn rename(&self, from: &Path, to: &Path) -> CoreResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if source == self.root || target == self.root {
            return Err(CoreError::InvalidPath {
                path: from.display().to_string(),
                reason: "refusing to move the realm root".into(),
            });
        }
        if !tokio::fs::try_exists(&source)
            .await
            .map_err(io_error(&source))?
        {
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        tokio::fs::rename(&source, &target)
            .await
            .map_err(io_error(&source))?;
        debug!(from = %source.display(), to = %target.display(), "Renamed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_relative_normalises() {
        assert_eq!(
            validate_relative("/notes/./a.md").unwrap(),
            PathBuf::from("notes/a.md")
        );
        assert_eq!(validate_relative("").unwrap(), PathBuf::new());
        assert!(validate_relative("../secret").is_err());
        assert!(validate_relative("a/../../b").is_err());
    }

    #[test]
    fn test_validate_component() {
        assert!(validate_component("My Board").is_ok());
        assert!(validate_component("..").is_err());
        assert!(validate_component("a\\b").is_err());
        assert!(validate_component("   ").is_err());
    }

    #[tokio::test]
    async fn test_local_fs_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = LocalRealmFs::new(tmp.path());

        fs.create_dir(Path::new("main/kanban/board-1")).await.unwrap();
        assert!(tmp.path().join("main/kanban/board-1").is_dir());

        fs.write_file(Path::new("plugins/x/index.rhai"), b"fn on_create(card) {}")
            .await
            .unwrap();
        assert_eq!(
            fs.read_to_string(Path::new("plugins/x/index.rhai"))
                .await
                .unwrap()
                .as_deref(),
            Some("fn on_create(card) {}")
        );
        assert!(
            fs.read_to_string(Path::new("plugins/y/index.rhai"))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(fs.list_dirs(Path::new("plugins")).await.unwrap(), vec!["x"]);

        fs.rename(Path::new("main/kanban/board-1"), Path::new("main/kanban/board-2"))
            .await
            .unwrap();
        assert!(tmp.path().join("main/kanban/board-2").is_dir());
        assert!(!tmp.path().join("main/kanban/board-1").exists());
        // Moving something that is not there is a no-op.
        fs.rename(Path::new("main/kanban/ghost"), Path::new("main/kanban/x"))
            .await
            .unwrap();

        fs.remove_dir(Path::new("main/kanban")).await.unwrap();
        assert!(!tmp.path().join("main/kanban").exists());
        // Removing again is a no-op.
        fs.remove_dir(Path::new("main/kanban")).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_fs_refuses_escape_and_root() {
        let tmp = tempfile::tempdir().unwrap();
        let fs = LocalRealmFs::new(tmp.path());
        assert!(fs.create_dir(Path::new("../outside")).await.is_err());
        assert!(fs.remove_dir(Path::new("")).await.is_err());
    }
}
