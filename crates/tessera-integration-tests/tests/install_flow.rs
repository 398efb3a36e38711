//! Installing a plugin from the registry, using it, and removing it again.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tessera_core::ToolName;
use tessera_events::Channel;
use tessera_runtime::{InstallOutcome, Orchestrator, RuntimeError};
use tessera_test::prelude::*;

async fn start(realm: &TestRealm, registry: &MockRegistry) -> Orchestrator {
    Orchestrator::builder(realm.path())
        .registry(Arc::new(registry.clone()))
        .start()
        .await
        .unwrap()
}

/// Collect every payload emitted as `event` on `channel`.
fn capture(channel: &Channel, event: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    channel.on(event, move |payload| sink.lock().unwrap().push(payload.clone()));
    seen
}

#[tokio::test]
async fn test_install_then_add_card() {
    setup_test_logging_default();
    let realm = TestRealm::new();
    let registry = MockRegistry::new().with_plugin("someone/notes", test_fetched("notes"));
    let mut orchestrator = start(&realm, &registry).await;
    let tool = ToolName::from_static("notes");

    let outcome = orchestrator.install("Notes", "someone/notes", false).await.unwrap();
    assert_eq!(outcome, InstallOutcome::Installed { loaded: true });
    assert!(realm.exists("plugins/notes/index.rhai"));
    assert!(realm.exists("plugins/notes/manifest.json"));

    let descriptor = orchestrator.descriptor(&tool).await.unwrap().unwrap();
    assert!(descriptor.signed);
    assert!(descriptor.cards.is_empty());

    let created = capture(orchestrator.channel(&tool).unwrap(), "script-create");
    assert!(created.lock().unwrap().is_empty());

    let card = orchestrator.add_instance("board-1", &tool, "📋").await.unwrap();
    assert_eq!(*created.lock().unwrap(), vec![json!(card.id)]);
    assert!(realm.exists("main/notes/board-1"));
    assert!(!card.is_placed);

    let metadata = orchestrator.channel(&tool).unwrap().get_data("metadata").unwrap();
    assert_eq!(metadata["cards"][0]["name"], "board-1");

    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_fetch_leaves_realm_untouched() {
    let realm = TestRealm::new();
    let registry = MockRegistry::new();
    let mut orchestrator = start(&realm, &registry).await;

    let err = orchestrator.install("ghost", "someone/ghost", false).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Plugin(_)));
    assert!(!realm.exists("plugins/ghost"));
    assert!(
        orchestrator
            .descriptor(&ToolName::from_static("ghost"))
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(registry.requests(), vec!["someone/ghost".to_string()]);
}

#[tokio::test]
async fn test_uninstall_unloads_placed_and_deletes_all() {
    let realm = TestRealm::new();
    let registry = MockRegistry::new().with_plugin("someone/notes", test_fetched("notes"));
    let mut orchestrator = start(&realm, &registry).await;
    let tool = ToolName::from_static("notes");
    orchestrator.install("notes", "someone/notes", false).await.unwrap();

    let placed = orchestrator.add_instance("a", &tool, "🅰").await.unwrap();
    let loose = orchestrator.add_instance("b", &tool, "🅱").await.unwrap();
    orchestrator.toggle_instance(&placed.id, &tool).await.unwrap();
    assert!(orchestrator.load_instance(&placed.id, &tool).await.is_ok());

    let channel = orchestrator.channel(&tool).unwrap().clone();
    let unloaded = capture(&channel, "script-unload");
    let deleted = capture(&channel, "script-delete");

    orchestrator.uninstall(&tool).await.unwrap();

    assert_eq!(*unloaded.lock().unwrap(), vec![json!(placed.id)]);
    assert_eq!(
        *deleted.lock().unwrap(),
        vec![json!(placed.id), json!(loose.id)]
    );
    assert!(orchestrator.descriptor(&tool).await.unwrap().is_none());
    assert!(orchestrator.channel(&tool).is_none());
    assert!(orchestrator.instances().is_empty());
    assert!(!realm.exists("plugins/notes"));
    assert!(!realm.exists("main/notes"));
}

#[tokio::test]
async fn test_incomplete_plugin_is_installed_but_not_loaded() {
    let realm = TestRealm::new();
    let registry = MockRegistry::new().with_plugin(
        "someone/broken",
        test_fetched_with("broken", "0.1.0", INCOMPLETE_SCRIPT_PLUGIN),
    );
    let mut orchestrator = start(&realm, &registry).await;
    let tool = ToolName::from_static("broken");

    let outcome = orchestrator.install("broken", "someone/broken", false).await.unwrap();
    assert_eq!(outcome, InstallOutcome::Installed { loaded: false });
    assert!(orchestrator.channel(&tool).is_none());

    // The card is recorded but never reaches a plugin.
    let card = orchestrator.add_instance("x", &tool, "❓").await.unwrap();
    orchestrator.toggle_instance(&card.id, &tool).await.unwrap();
    assert!(!orchestrator.load_instance(&card.id, &tool).await.is_ok());
    assert!(!realm.exists("main/broken/x"));
}
