//! Mock implementations for testing.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use tessera_core::{CardId, CardRecord, CoreResult, HookOutcome, RealmFs, validate_relative};
use tessera_events::topics;
use tessera_plugins::{
    FetchedPlugin, NativeFactory, Plugin, PluginContext, PluginError, PluginResult, RegistryClient,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Recording plugin
// ---------------------------------------------------------------------------

/// One observation made by a [`RecordingPlugin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// `on_create` ran for the card.
    Create(CardId),
    /// `on_delete` ran for the card.
    Delete(CardId),
    /// `on_load` ran for the card.
    Load(CardId),
    /// `on_unload` ran for the card.
    Unload(CardId),
    /// The tool's metadata was broadcast with this many cards.
    Metadata(usize),
}

impl Recorded {
    /// The hook name, or `"metadata"` for broadcasts.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "on_create",
            Self::Delete(_) => "on_delete",
            Self::Load(_) => "on_load",
            Self::Unload(_) => "on_unload",
            Self::Metadata(_) => "metadata",
        }
    }

    /// The card a hook ran for.
    #[must_use]
    pub fn card_id(&self) -> Option<&CardId> {
        match self {
            Self::Create(id) | Self::Delete(id) | Self::Load(id) | Self::Unload(id) => Some(id),
            Self::Metadata(_) => None,
        }
    }
}

/// Shared, ordered log of hook calls and metadata broadcasts.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation.
    pub fn push(&self, entry: Recorded) {
        lock(&self.entries).push(entry);
    }

    /// Everything observed so far, in order.
    #[must_use]
    pub fn entries(&self) -> Vec<Recorded> {
        lock(&self.entries).clone()
    }

    /// Hook calls only, without metadata broadcasts.
    #[must_use]
    pub fn hooks(&self) -> Vec<Recorded> {
        self.entries()
            .into_iter()
            .filter(|e| !matches!(e, Recorded::Metadata(_)))
            .collect()
    }

    /// How many times `name` was observed.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }

    /// Hook names observed for one card, in order.
    #[must_use]
    pub fn hooks_for(&self, id: &CardId) -> Vec<&'static str> {
        lock(&self.entries)
            .iter()
            .filter(|e| e.card_id() == Some(id))
            .map(Recorded::name)
            .collect()
    }

    /// Forget everything observed so far.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

/// A [`Plugin`] that records every hook call and fails on demand.
///
/// Installed through [`RecordingPlugin::factory`], it also records every
/// `"metadata"` broadcast on its tool channel, so tests can check that hooks
/// run before the rebroadcast.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlugin {
    recorder: Recorder,
    failing: HashSet<&'static str>,
    panicking: HashSet<&'static str>,
}

impl RecordingPlugin {
    /// Create a plugin that records into `recorder` and always succeeds.
    #[must_use]
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            failing: HashSet::new(),
            panicking: HashSet::new(),
        }
    }

    /// Make `hook` (e.g. `"on_delete"`) report failure.
    #[must_use]
    pub fn failing_on(mut self, hook: &'static str) -> Self {
        self.failing.insert(hook);
        self
    }

    /// Make `hook` panic.
    #[must_use]
    pub fn panicking_on(mut self, hook: &'static str) -> Self {
        self.panicking.insert(hook);
        self
    }

    /// A factory for the orchestrator builder. Every instance shares this
    /// plugin's recorder and failure settings.
    #[must_use]
    pub fn factory(self) -> NativeFactory {
        Arc::new(move |ctx: &PluginContext| {
            let recorder = self.recorder.clone();
            ctx.channel.on(topics::METADATA, move |payload| {
                let cards = payload
                    .get("cards")
                    .and_then(|c| c.as_array())
                    .map_or(0, Vec::len);
                recorder.push(Recorded::Metadata(cards));
            });
            Box::new(self.clone()) as Box<dyn Plugin>
        })
    }

    fn outcome(&self, hook: &'static str, entry: Recorded) -> HookOutcome {
        self.recorder.push(entry);
        assert!(!self.panicking.contains(hook), "{hook} panicked on purpose");
        if self.failing.contains(hook) {
            HookOutcome::failed(format!("{hook} failed on purpose"))
        } else {
            HookOutcome::ok()
        }
    }
}

#[async_trait]
impl Plugin for RecordingPlugin {
    async fn on_create(&mut self, card: &CardRecord) -> HookOutcome {
        self.outcome("on_create", Recorded::Create(card.id.clone()))
    }

    async fn on_delete(&mut self, card: &CardRecord) -> HookOutcome {
        self.outcome("on_delete", Recorded::Delete(card.id.clone()))
    }

    async fn on_load(&mut self, card: &CardRecord) -> HookOutcome {
        self.outcome("on_load", Recorded::Load(card.id.clone()))
    }

    async fn on_unload(&mut self, card_id: &CardId) -> HookOutcome {
        self.outcome("on_unload", Recorded::Unload(card_id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// In-memory [`RegistryClient`] serving canned plugins by repository.
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    plugins: Arc<Mutex<HashMap<String, FetchedPlugin>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockRegistry {
    /// Create a registry with no plugins.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `plugin` for `repo`.
    #[must_use]
    pub fn with_plugin(self, repo: impl Into<String>, plugin: FetchedPlugin) -> Self {
        self.publish(repo, plugin);
        self
    }

    /// Serve `plugin` for `repo`, replacing any earlier version.
    pub fn publish(&self, repo: impl Into<String>, plugin: FetchedPlugin) {
        lock(&self.plugins).insert(repo.into(), plugin);
    }

    /// Repositories fetched so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn fetch(&self, repo: &str) -> PluginResult<FetchedPlugin> {
        lock(&self.requests).push(repo.to_string());
        lock(&self.plugins)
            .get(repo)
            .cloned()
            .ok_or_else(|| PluginError::Registry {
                message: format!("404 Not Found: {repo}"),
            })
    }
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

/// One call made against a [`RecordingRealmFs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsRequest {
    /// `create_dir`
    CreateDir(PathBuf),
    /// `remove_dir`
    RemoveDir(PathBuf),
    /// `write_file`
    WriteFile(PathBuf),
    /// `rename`
    Rename(PathBuf, PathBuf),
}

#[derive(Debug, Default)]
struct MemoryTree {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Vec<u8>>,
    requests: Vec<FsRequest>,
}

impl MemoryTree {
    fn add_dir(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                self.dirs.insert(ancestor.to_path_buf());
            }
        }
    }
}

/// In-memory [`RealmFs`] that records every mutating call.
///
/// Reads see earlier writes, so plugins installed through it can be loaded
/// back.
#[derive(Debug, Clone, Default)]
pub struct RecordingRealmFs {
    tree: Arc<Mutex<MemoryTree>>,
}

impl RecordingRealmFs {
    /// Create an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutating calls so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<FsRequest> {
        lock(&self.tree).requests.clone()
    }

    /// Directories created by `create_dir` calls so far.
    #[must_use]
    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                FsRequest::CreateDir(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Whether the directory currently exists.
    #[must_use]
    pub fn has_dir(&self, path: impl AsRef<Path>) -> bool {
        lock(&self.tree).dirs.contains(path.as_ref())
    }

    /// Contents of a file, if present.
    #[must_use]
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        lock(&self.tree).files.get(path.as_ref()).cloned()
    }

    /// Seed a file without recording a request.
    pub fn seed_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut tree = lock(&self.tree);
        if let Some(parent) = path.parent() {
            tree.add_dir(parent);
        }
        tree.files.insert(path.to_path_buf(), contents.into());
    }
}

fn clean(path: &Path) -> CoreResult<PathBuf> {
    validate_relative(&path.to_string_lossy())
}

fn move_prefix<V>(map: &mut BTreeMap<PathBuf, V>, from: &Path, to: &Path) {
    let moved: Vec<PathBuf> = map.keys().filter(|k| k.starts_with(from)).cloned().collect();
    for key in moved {
        if let (Some(value), Ok(rest)) = (map.remove(&key), key.strip_prefix(from)) {
            map.insert(to.join(rest), value);
        }
    }
}

#[async_trait]
impl RealmFs for RecordingRealmFs {
    async fn create_dir(&self, relative: &Path) -> CoreResult<()> {
        let path = clean(relative)?;
        let mut tree = lock(&self.tree);
        tree.add_dir(&path);
        tree.requests.push(FsRequest::CreateDir(path));
        Ok(())
    }

    async fn remove_dir(&self, relative: &Path) -> CoreResult<()> {
        let path = clean(relative)?;
        let mut tree = lock(&self.tree);
        tree.dirs.retain(|d| !d.starts_with(&path));
        tree.files.retain(|f, _| !f.starts_with(&path));
        tree.requests.push(FsRequest::RemoveDir(path));
        Ok(())
    }

    async fn write_file(&self, relative: &Path, contents: &[u8]) -> CoreResult<()> {
        let path = clean(relative)?;
        let mut tree = lock(&self.tree);
        if let Some(parent) = path.parent() {
            tree.add_dir(parent);
        }
        tree.files.insert(path.clone(), contents.to_vec());
        tree.requests.push(FsRequest::WriteFile(path));
        Ok(())
    }

    async fn read_to_string(&self, relative: &Path) -> CoreResult<Option<String>> {
        let path = clean(relative)?;
        let tree = lock(&self.tree);
        Ok(tree
            .files
            .get(&path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
    }

    async fn list_dirs(&self, relative: &Path) -> CoreResult<Vec<String>> {
        let path = clean(relative)?;
        let tree = lock(&self.tree);
        Ok(tree
            .dirs
            .iter()
            .filter(|d| d.parent() == Some(path.as_path()))
            .filter_map(|d| d.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    async fn rename(&self, from: &Path, to: &Path) -> CoreResult<()> {
        let from = clean(from)?;
        let to = clean(to)?;
        let mut tree = lock(&self.tree);
        let dirs: Vec<PathBuf> = tree.dirs.iter().filter(|d| d.starts_with(&from)).cloned().collect();
        for dir in dirs {
            tree.dirs.remove(&dir);
            if let Ok(rest) = dir.strip_prefix(&from) {
                let moved = to.join(rest);
                tree.add_dir(&moved);
            }
        }
        move_prefix(&mut tree.files, &from, &to);
        tree.requests.push(FsRequest::Rename(from, to));
        Ok(())
    }
}
