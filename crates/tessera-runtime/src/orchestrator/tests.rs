use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tessera_core::{CardId, CardRecord, ToolDescriptor, ToolName};
use tessera_events::topics;
use tessera_plugins::PluginOrigin;
use tessera_storage::{KvStore, MemoryKvStore, StorageError, StorageResult};
use tessera_test::prelude::*;

use super::*;

fn recorder_tool() -> ToolName {
    ToolName::from_static("recorder")
}

fn seed(descriptors: &[ToolDescriptor]) -> InstanceStore {
    let mut map: Map<String, Value> = InstanceStore::defaults();
    for descriptor in descriptors {
        map.insert(
            descriptor.name.to_string(),
            serde_json::to_value(descriptor).unwrap(),
        );
    }
    InstanceStore::from_store(Arc::new(MemoryKvStore::with_defaults(map)))
}

/// Reads pass through; every write fails.
struct ReadOnlyStore(MemoryKvStore);

impl ReadOnlyStore {
    fn refuse() -> StorageError {
        StorageError::Io {
            path: PathBuf::from(".tessera/main.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        }
    }
}

#[async_trait]
impl KvStore for ReadOnlyStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.0.get(key).await
    }

    async fn set(&self, _key: &str, _value: Value) -> StorageResult<()> {
        Err(Self::refuse())
    }

    async fn set_many(&self, _entries: Vec<(String, Value)>) -> StorageResult<()> {
        Err(Self::refuse())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.0.remove(key).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        self.0.keys().await
    }

    async fn snapshot(&self) -> StorageResult<Map<String, Value>> {
        self.0.snapshot().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.0.close().await
    }

    fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

struct Harness {
    realm: TestRealm,
    fs: RecordingRealmFs,
    registry: MockRegistry,
    recorder: Recorder,
}

impl Harness {
    fn new() -> Self {
        setup_test_logging_default();
        Self {
            realm: TestRealm::new(),
            fs: RecordingRealmFs::new(),
            registry: MockRegistry::new(),
            recorder: Recorder::new(),
        }
    }

    fn builder(&self, store: InstanceStore) -> OrchestratorBuilder {
        Orchestrator::builder(self.realm.path())
            .fs(Arc::new(self.fs.clone()))
            .registry(Arc::new(self.registry.clone()))
            .store(store)
    }

    /// Start with the built-ins plus a signed `recorder` tool holding `cards`.
    async fn start_with(&self, plugin: RecordingPlugin, cards: Vec<CardRecord>) -> Orchestrator {
        let store = seed(&[test_descriptor("recorder", cards)]);
        self.builder(store)
            .native(recorder_tool(), plugin.factory())
            .start()
            .await
            .unwrap()
    }

    async fn start(&self) -> Orchestrator {
        self.start_with(RecordingPlugin::new(self.recorder.clone()), Vec::new())
            .await
    }

    fn card_dir_requests(&self, op: fn(PathBuf) -> FsRequest, tool: &str, name: &str) -> usize {
        let wanted = op(PathBuf::from(format!("main/{tool}/{name}")));
        self.fs
            .requests()
            .into_iter()
            .filter(|r| *r == wanted)
            .count()
    }
}

/// The persisted cards of `tool` match the UI list.
async fn assert_converged(orchestrator: &Orchestrator, tool: &ToolName) {
    let persisted = orchestrator
        .descriptor(tool)
        .await
        .unwrap()
        .map(|d| d.cards)
        .unwrap_or_default();
    assert_eq!(persisted, orchestrator.cards_of(tool));
}

// ---------------------------------------------------------------------------
// add_instance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_add_instance_creates_card() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();

    let card = orchestrator
        .add_instance("board-1", &tool, "📋")
        .await
        .unwrap();

    assert!(!card.is_placed);
    assert_eq!(orchestrator.instances(), std::slice::from_ref(&card));
    assert_eq!(h.recorder.count("on_create"), 1);
    assert_eq!(h.card_dir_requests(FsRequest::CreateDir, "recorder", "board-1"), 1);
    assert_eq!(h.recorder.entries().last(), Some(&Recorded::Metadata(1)));
    assert_converged(&orchestrator, &tool).await;
}

#[tokio::test]
async fn test_add_instance_rejects_duplicate_name() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();

    let err = orchestrator
        .add_instance("board-1", &tool, "🗂")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "A card with that name already exists");
    assert!(err.is_user_visible());
    assert_eq!(orchestrator.instances().len(), 1);
    assert_eq!(h.recorder.count("on_create"), 1);

    // Same name under another tool is fine.
    let kanban = ToolName::from_static("kanban");
    orchestrator.add_instance("board-1", &kanban, "📋").await.unwrap();
    assert_eq!(orchestrator.instances().len(), 2);
}

#[tokio::test]
async fn test_add_instance_to_unknown_tool() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;

    let err = orchestrator
        .add_instance("board-1", &ToolName::from_static("weather"), "📋")
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::ToolNotFound(_)));
    assert!(orchestrator.instances().is_empty());
}

#[tokio::test]
async fn test_add_instance_rejects_path_like_names() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;

    let err = orchestrator
        .add_instance("../escape", &recorder_tool(), "📋")
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Core(_)));
    assert!(orchestrator.instances().is_empty());
}

#[tokio::test]
async fn test_failed_create_keeps_card_without_directory() {
    let h = Harness::new();
    let plugin = RecordingPlugin::new(h.recorder.clone()).failing_on("on_create");
    let mut orchestrator = h.start_with(plugin, Vec::new()).await;
    let tool = recorder_tool();

    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    assert_eq!(orchestrator.instances().len(), 1);
    assert_eq!(h.card_dir_requests(FsRequest::CreateDir, "recorder", "board-1"), 0);
    assert_converged(&orchestrator, &tool).await;

    // A card whose create failed never loads, even when placed.
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();
    let outcome = orchestrator.load_instance(&card.id, &tool).await;
    assert!(!outcome.is_ok());
    assert_eq!(h.recorder.hooks_for(&card.id), vec!["on_create"]);
}

// ---------------------------------------------------------------------------
// toggle / load
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_toggle_twice_unloads_once_before_broadcast() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    h.recorder.clear();

    assert!(orchestrator.toggle_instance(&card.id, &tool).await.unwrap());
    assert!(h.recorder.hooks().is_empty());
    assert_converged(&orchestrator, &tool).await;

    // Placing the card renders its surface.
    assert!(orchestrator.load_instance(&card.id, &tool).await.is_ok());
    h.recorder.clear();

    assert!(!orchestrator.toggle_instance(&card.id, &tool).await.unwrap());
    assert_eq!(
        h.recorder.entries(),
        vec![Recorded::Unload(card.id.clone()), Recorded::Metadata(1)]
    );
    assert!(!orchestrator.instance(&tool, &card.id).unwrap().is_placed);
    assert_converged(&orchestrator, &tool).await;
}

#[tokio::test]
async fn test_load_instance_failures_are_outcomes() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;

    let unknown_tool = orchestrator
        .load_instance(&CardId::from("nope"), &ToolName::from_static("weather"))
        .await;
    assert!(!unknown_tool.is_ok());

    let unknown_card = orchestrator
        .load_instance(&CardId::from("nope"), &recorder_tool())
        .await;
    assert!(!unknown_card.is_ok());
    assert!(h.recorder.hooks().is_empty());
}

#[tokio::test]
async fn test_load_twice_runs_hook_once() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();

    assert!(orchestrator.load_instance(&card.id, &tool).await.is_ok());
    assert!(orchestrator.load_instance(&card.id, &tool).await.is_ok());
    assert_eq!(h.recorder.count("on_load"), 1);
}

#[tokio::test]
async fn test_unplaced_card_does_not_load() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();

    let outcome = orchestrator.load_instance(&card.id, &tool).await;
    assert!(!outcome.is_ok());
    assert!(outcome.to_string().contains("not placed"));
    assert_eq!(h.recorder.count("on_load"), 0);
    assert!(!orchestrator.tool_map().get(&tool).unwrap().is_loaded(&card.id));

    // Placed cards load; unplacing stops further loads.
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();
    assert!(orchestrator.load_instance(&card.id, &tool).await.is_ok());
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();
    assert!(!orchestrator.load_instance(&card.id, &tool).await.is_ok());
    assert_eq!(h.recorder.count("on_load"), 1);
}

// ---------------------------------------------------------------------------
// remove_instance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_remove_loaded_card_unloads_before_delete() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();
    orchestrator.load_instance(&card.id, &tool).await;

    orchestrator
        .remove_instance(std::slice::from_ref(&card.id), &tool, true)
        .await
        .unwrap();

    assert_eq!(
        h.recorder.hooks_for(&card.id),
        vec!["on_create", "on_load", "on_unload", "on_delete"]
    );
    assert!(orchestrator.instances().is_empty());
    assert_eq!(h.card_dir_requests(FsRequest::RemoveDir, "recorder", "board-1"), 1);
    assert_eq!(h.recorder.entries().last(), Some(&Recorded::Metadata(0)));
    assert_converged(&orchestrator, &tool).await;
}

#[tokio::test]
async fn test_remove_unloaded_card_skips_unload_hook() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();

    orchestrator
        .remove_instance(std::slice::from_ref(&card.id), &tool, false)
        .await
        .unwrap();

    assert_eq!(h.recorder.hooks_for(&card.id), vec!["on_create", "on_delete"]);
    assert_eq!(h.card_dir_requests(FsRequest::RemoveDir, "recorder", "board-1"), 0);
}

#[tokio::test]
async fn test_remove_many_keeps_directories() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let a = orchestrator.add_instance("a", &tool, "🅰").await.unwrap();
    let b = orchestrator.add_instance("b", &tool, "🅱").await.unwrap();
    let c = orchestrator.add_instance("c", &tool, "©").await.unwrap();

    orchestrator
        .remove_instance(&[a.id.clone(), b.id.clone()], &tool, true)
        .await
        .unwrap();

    assert_eq!(orchestrator.instances(), std::slice::from_ref(&c));
    assert_eq!(h.recorder.count("on_delete"), 2);
    assert!(
        !h.fs
            .requests()
            .iter()
            .any(|r| matches!(r, FsRequest::RemoveDir(_)))
    );
    assert_converged(&orchestrator, &tool).await;
}

// ---------------------------------------------------------------------------
// field updates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_field_updates_persist_and_broadcast() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();

    orchestrator.change_emoji("🔥", &card.id, &tool).await.unwrap();
    assert!(orchestrator.toggle_favourite(&card.id, &tool).await.unwrap());

    let mut moved = orchestrator.instance(&tool, &card.id).unwrap().clone();
    moved.x = 4;
    moved.y = 2;
    moved.name = "sneaky".to_string();
    orchestrator.update_instance(moved).await.unwrap();

    let stored = orchestrator.instance(&tool, &card.id).unwrap();
    assert_eq!(stored.emoji, "🔥");
    assert!(stored.is_favored);
    assert_eq!((stored.x, stored.y), (4, 2));
    assert_eq!(stored.name, "board-1");
    assert_converged(&orchestrator, &tool).await;
    assert_eq!(h.recorder.count("metadata"), 5);
}

#[tokio::test]
async fn test_update_instances_checks_every_card_first() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();

    let mut changed = card.clone();
    changed.w = 9;
    let stranger = test_card("recorder", "ghost");

    let err = orchestrator
        .update_instances(vec![changed.clone(), stranger])
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::CardNotFound { .. }));
    assert_eq!(orchestrator.instance(&tool, &card.id).unwrap().w, card.w);

    orchestrator.update_instances(vec![changed]).await.unwrap();
    assert_eq!(orchestrator.instance(&tool, &card.id).unwrap().w, 9);
    assert_converged(&orchestrator, &tool).await;
}

#[tokio::test]
async fn test_update_keeps_placement() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();
    assert!(orchestrator.load_instance(&card.id, &tool).await.is_ok());

    let mut stale = orchestrator.instance(&tool, &card.id).unwrap().clone();
    stale.is_placed = false;
    stale.w = 7;
    orchestrator.update_instances(vec![stale]).await.unwrap();

    let stored = orchestrator.instance(&tool, &card.id).unwrap();
    assert!(stored.is_placed);
    assert_eq!(stored.w, 7);
    assert!(orchestrator.tool_map().get(&tool).unwrap().is_loaded(&card.id));
    assert_eq!(h.recorder.count("on_unload"), 0);
    assert_converged(&orchestrator, &tool).await;

    // The next unplace still runs the unload hook.
    assert!(!orchestrator.toggle_instance(&card.id, &tool).await.unwrap());
    assert_eq!(h.recorder.count("on_unload"), 1);
}

#[tokio::test]
async fn test_rename_moves_directory_and_reloads() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    orchestrator.add_instance("board-2", &tool, "📋").await.unwrap();
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();
    orchestrator.load_instance(&card.id, &tool).await;

    let err = orchestrator
        .rename_instance(&card.id, &tool, "board-2")
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::DuplicateCardName { .. }));

    orchestrator
        .rename_instance(&card.id, &tool, "backlog")
        .await
        .unwrap();

    assert_eq!(orchestrator.instance(&tool, &card.id).unwrap().name, "backlog");
    assert!(h.fs.has_dir("main/recorder/backlog"));
    assert!(!h.fs.has_dir("main/recorder/board-1"));
    assert_eq!(
        h.recorder.hooks_for(&card.id),
        vec!["on_create", "on_load", "on_unload", "on_load"]
    );
    assert_converged(&orchestrator, &tool).await;
}

// ---------------------------------------------------------------------------
// built-in surfaces
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_transfer_tasks_follows_renamed_column() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let kanban = ToolName::from_static("kanban");
    let card = orchestrator.add_instance("todo", &kanban, "📋").await.unwrap();
    orchestrator.toggle_instance(&card.id, &kanban).await.unwrap();
    assert!(orchestrator.load_instance(&card.id, &kanban).await.is_ok());

    let reply = orchestrator
        .transfer_tasks(&kanban, "todo", json!([{"title": "write tests"}]))
        .await
        .unwrap();
    assert_eq!(reply, Some(json!({"received": 1})));

    orchestrator.rename_instance(&card.id, &kanban, "doing").await.unwrap();
    assert_eq!(
        orchestrator
            .transfer_tasks(&kanban, "todo", json!({"title": "lost"}))
            .await
            .unwrap(),
        None
    );
    let reply = orchestrator
        .transfer_tasks(&kanban, "doing", json!({"title": "ship"}))
        .await
        .unwrap();
    assert_eq!(reply, Some(json!({"received": 1})));

    let surface = orchestrator
        .channel(&kanban)
        .unwrap()
        .get_data(card.id.as_str())
        .unwrap();
    assert_eq!(surface["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_request_settings_reaches_host() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let embed = ToolName::from_static("embed");
    let card = orchestrator.add_instance("video", &embed, "🎬").await.unwrap();
    orchestrator.toggle_instance(&card.id, &embed).await.unwrap();
    orchestrator.load_instance(&card.id, &embed).await;

    orchestrator.request_settings(&card.id, &embed).unwrap();

    let channel = orchestrator.channel(&embed).unwrap();
    assert_eq!(
        channel.get_data(&topics::settings(card.id.as_str())),
        Some(Value::Bool(true))
    );
    let forwarded = orchestrator
        .host_channel()
        .get_data(topics::TOOL_SETTINGS)
        .unwrap();
    assert_eq!(forwarded["cardId"], card.id.as_str());

    assert!(matches!(
        orchestrator.request_settings(&CardId::from("nope"), &embed),
        Err(RuntimeError::CardNotFound { .. })
    ));
}

// ---------------------------------------------------------------------------
// startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_startup_adopts_and_sorts_cards() {
    let h = Harness::new();
    let newer = test_card("recorder", "newer")
        .with_created_at(test_time(20))
        .placed(true);
    let older = test_card("kanban", "older").with_created_at(test_time(10));
    let store = seed(&[
        test_descriptor("recorder", vec![newer.clone()]),
        test_descriptor("kanban", vec![older.clone()]),
    ]);
    let mut orchestrator = h
        .builder(store)
        .native(
            recorder_tool(),
            RecordingPlugin::new(h.recorder.clone()).factory(),
        )
        .start()
        .await
        .unwrap();

    assert_eq!(orchestrator.instances(), &[older, newer.clone()]);
    assert_eq!(h.recorder.entries(), vec![Recorded::Metadata(1)]);

    // Persisted cards load without a fresh create.
    assert!(orchestrator.load_instance(&newer.id, &recorder_tool()).await.is_ok());
    assert_eq!(h.recorder.hooks_for(&newer.id), vec!["on_load"]);
}

#[tokio::test]
async fn test_unsigned_tools_need_opt_in() {
    let h = Harness::new();
    let unsigned = test_descriptor("recorder", Vec::new()).with_signed(false);

    let orchestrator = h
        .builder(seed(std::slice::from_ref(&unsigned)))
        .native(recorder_tool(), RecordingPlugin::new(h.recorder.clone()).factory())
        .start()
        .await
        .unwrap();
    assert!(!orchestrator.tool_names().contains(&recorder_tool()));

    let orchestrator = h
        .builder(seed(&[unsigned]))
        .native(recorder_tool(), RecordingPlugin::new(h.recorder.clone()).factory())
        .load_unsigned(true)
        .start()
        .await
        .unwrap();
    assert!(orchestrator.tool_names().contains(&recorder_tool()));
}

#[tokio::test]
async fn test_unsigned_discovery_merges_manifests() {
    let h = Harness::new();
    h.fs.seed_file("plugins/weather/index.rhai", SCRIPT_PLUGIN);
    h.fs.seed_file(
        "plugins/weather/manifest.json",
        r#"{"name": "Weather", "version": "0.3.0", "author": "acme"}"#,
    );

    let orchestrator = h
        .builder(seed(&[]))
        .load_unsigned(true)
        .start()
        .await
        .unwrap();

    let weather = ToolName::from_static("weather");
    let descriptor = orchestrator.descriptor(&weather).await.unwrap().unwrap();
    assert!(!descriptor.signed);
    assert_eq!(descriptor.version, "0.3.0");
    assert_eq!(descriptor.icon, "plugins/weather/icon.svg");
    assert_eq!(descriptor.extra["author"], "acme");
    assert!(orchestrator.tool_names().contains(&weather));
}

#[tokio::test]
async fn test_unsigned_discovery_skips_builtin_names() {
    let h = Harness::new();
    h.fs.seed_file("plugins/kanban/index.rhai", SCRIPT_PLUGIN);
    h.fs.seed_file(
        "plugins/kanban/manifest.json",
        r#"{"name": "Kanban", "version": "9.9.9"}"#,
    );

    let orchestrator = h
        .builder(seed(&[]))
        .load_unsigned(true)
        .start()
        .await
        .unwrap();

    let kanban = ToolName::from_static("kanban");
    let descriptor = orchestrator.descriptor(&kanban).await.unwrap().unwrap();
    assert!(descriptor.signed);
    assert_ne!(descriptor.version, "9.9.9");
}

// ---------------------------------------------------------------------------
// install / uninstall
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_install_then_add_card() {
    let h = Harness::new();
    h.registry.publish("acme/kanban", test_fetched("Kanban"));
    let mut orchestrator = h
        .builder(InstanceStore::from_store(Arc::new(MemoryKvStore::new())))
        .start()
        .await
        .unwrap();
    let kanban = ToolName::from_static("kanban");

    let outcome = orchestrator
        .install("kanban", "acme/kanban", false)
        .await
        .unwrap();
    assert_eq!(outcome, InstallOutcome::Installed { loaded: true });

    let descriptor = orchestrator.descriptor(&kanban).await.unwrap().unwrap();
    assert!(descriptor.signed);
    assert!(descriptor.cards.is_empty());
    assert_eq!(descriptor.extra["title"], "Kanban");
    assert_eq!(descriptor.repo.as_deref(), Some("acme/kanban"));
    assert!(h.fs.file("plugins/kanban/index.rhai").is_some());
    assert!(h.fs.file("plugins/kanban/manifest.json").is_some());

    let created = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&created);
    orchestrator
        .channel(&kanban)
        .unwrap()
        .on("script-create", move |id| sink.lock().unwrap().push(id.clone()));

    let card = orchestrator.add_instance("board-1", &kanban, "📋").await.unwrap();
    assert!(!card.is_placed);
    assert_eq!(*created.lock().unwrap(), vec![json!(card.id.as_str())]);
    assert_eq!(h.card_dir_requests(FsRequest::CreateDir, "kanban", "board-1"), 1);
    assert_converged(&orchestrator, &kanban).await;
}

#[tokio::test]
async fn test_install_guards() {
    let h = Harness::new();
    h.registry.publish("acme/weather", test_fetched("Weather"));
    h.registry.publish("acme/impostor", test_fetched("Radar"));
    let mut orchestrator = h.builder(seed(&[])).start().await.unwrap();
    let weather = ToolName::from_static("weather");

    assert!(matches!(
        orchestrator.install("weather", "acme/missing", false).await,
        Err(RuntimeError::Plugin(_))
    ));
    assert!(matches!(
        orchestrator.install("weather", "acme/impostor", false).await,
        Err(RuntimeError::Plugin(_))
    ));
    assert!(orchestrator.descriptor(&weather).await.unwrap().is_none());
    assert!(h.fs.requests().is_empty());

    orchestrator.install("Weather", "acme/weather", false).await.unwrap();
    assert!(matches!(
        orchestrator.install("weather", "acme/weather", false).await,
        Err(RuntimeError::ToolAlreadyInstalled(_))
    ));
}

#[tokio::test]
async fn test_failed_install_write_removes_plugin_files() {
    let h = Harness::new();
    h.registry.publish("acme/weather", test_fetched_with("Weather", "1.0.0", SCRIPT_PLUGIN));
    let store = ReadOnlyStore(MemoryKvStore::with_defaults(InstanceStore::defaults()));
    let mut orchestrator = h
        .builder(InstanceStore::from_store(Arc::new(store)))
        .start()
        .await
        .unwrap();
    let weather = ToolName::from_static("weather");

    let err = orchestrator
        .install("weather", "acme/weather", false)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Storage(_)));

    assert!(h.fs.file("plugins/weather/index.rhai").is_none());
    assert!(h.fs.file("plugins/weather/icon.svg").is_none());
    assert!(!h.fs.has_dir("plugins/weather"));
    assert_eq!(
        h.fs.requests().last(),
        Some(&FsRequest::RemoveDir(PathBuf::from("plugins/weather")))
    );
    assert!(orchestrator.descriptor(&weather).await.unwrap().is_none());
    assert!(orchestrator.channel(&weather).is_none());
}

#[tokio::test]
async fn test_downloaded_builtin_name_loads_script_after_restart() {
    let h = Harness::new();
    h.registry.publish("acme/kanban", test_fetched("Kanban"));
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let kanban = ToolName::from_static("kanban");

    let mut first = h
        .builder(InstanceStore::from_store(Arc::clone(&kv)))
        .start()
        .await
        .unwrap();
    first.install("kanban", "acme/kanban", false).await.unwrap();
    let origin = first.tool_map().get(&kanban).unwrap().origin();
    assert_eq!(origin, PluginOrigin::Script);
    drop(first);

    let second = h
        .builder(InstanceStore::from_store(kv))
        .start()
        .await
        .unwrap();
    let origin = second.tool_map().get(&kanban).unwrap().origin();
    assert_eq!(origin, PluginOrigin::Script);
}

#[tokio::test]
async fn test_seeded_builtins_still_load_natively() {
    let h = Harness::new();
    let orchestrator = h.start().await;
    let kanban = ToolName::from_static("kanban");

    let descriptor = orchestrator.descriptor(&kanban).await.unwrap().unwrap();
    assert!(descriptor.repo.is_none());
    let origin = orchestrator.tool_map().get(&kanban).unwrap().origin();
    assert_eq!(origin, PluginOrigin::Builtin);
}

#[tokio::test]
async fn test_update_keeps_cards_and_defers_reload() {
    let h = Harness::new();
    h.registry.publish("acme/weather", test_fetched("Weather"));
    let mut orchestrator = h.builder(seed(&[])).start().await.unwrap();
    let weather = ToolName::from_static("weather");
    orchestrator.install("weather", "acme/weather", false).await.unwrap();
    let card = orchestrator.add_instance("today", &weather, "☀").await.unwrap();

    h.registry.publish(
        "acme/weather",
        test_fetched_with("Weather", "2.0.0", SCRIPT_PLUGIN),
    );
    let outcome = orchestrator
        .install("weather", "acme/weather", true)
        .await
        .unwrap();
    assert_eq!(outcome, InstallOutcome::RestartRequired);

    let descriptor = orchestrator.descriptor(&weather).await.unwrap().unwrap();
    assert_eq!(descriptor.version, "2.0.0");
    assert_eq!(descriptor.cards, vec![card]);
    assert_eq!(descriptor.icon, "plugins/weather/icon.svg");
    assert!(h.fs.file("plugins/weather/icon.svg").is_some());
}

#[tokio::test]
async fn test_uninstall_sweeps_despite_failures() {
    let h = Harness::new();
    let plugin = RecordingPlugin::new(h.recorder.clone()).failing_on("on_delete");
    let mut orchestrator = h.start_with(plugin, Vec::new()).await;
    let tool = recorder_tool();
    let placed = orchestrator.add_instance("placed", &tool, "📌").await.unwrap();
    orchestrator.add_instance("shelved", &tool, "📦").await.unwrap();
    orchestrator.toggle_instance(&placed.id, &tool).await.unwrap();
    orchestrator.load_instance(&placed.id, &tool).await;
    h.recorder.clear();

    orchestrator.uninstall(&tool).await.unwrap();

    assert_eq!(h.recorder.count("on_unload"), 1);
    assert_eq!(h.recorder.count("on_delete"), 2);
    assert!(orchestrator.descriptor(&tool).await.unwrap().is_none());
    assert!(orchestrator.channel(&tool).is_none());
    assert!(orchestrator.instances().is_empty());
    let requests = h.fs.requests();
    assert!(requests.contains(&FsRequest::RemoveDir(PathBuf::from("main/recorder"))));
    assert!(requests.contains(&FsRequest::RemoveDir(PathBuf::from("plugins/recorder"))));

    assert!(matches!(
        orchestrator.uninstall(&tool).await,
        Err(RuntimeError::ToolNotFound(_))
    ));
}

#[tokio::test]
async fn test_shutdown_unloads_loaded_cards() {
    let h = Harness::new();
    let mut orchestrator = h.start().await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();
    orchestrator.load_instance(&card.id, &tool).await;

    orchestrator.shutdown().await.unwrap();
    assert_eq!(h.recorder.hooks_for(&card.id).last(), Some(&"on_unload"));
}

#[tokio::test]
async fn test_panicking_hook_is_contained() {
    let h = Harness::new();
    let plugin = RecordingPlugin::new(h.recorder.clone()).panicking_on("on_load");
    let mut orchestrator = h.start_with(plugin, Vec::new()).await;
    let tool = recorder_tool();
    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();

    let outcome = orchestrator.load_instance(&card.id, &tool).await;
    assert!(!outcome.is_ok());

    // The card is still usable afterwards.
    orchestrator
        .remove_instance(std::slice::from_ref(&card.id), &tool, false)
        .await
        .unwrap();
    assert_eq!(h.recorder.count("on_delete"), 1);
}
