//! State that must survive closing and reopening a realm.

use serde_json::json;
use tessera_core::ToolName;
use tessera_runtime::Orchestrator;
use tessera_test::prelude::*;

#[tokio::test]
async fn test_cards_and_content_survive_restart() {
    setup_test_logging_default();
    let realm = TestRealm::new();
    let kanban = ToolName::from_static("kanban");

    let mut first = Orchestrator::builder(realm.path()).start().await.unwrap();
    let card = first.add_instance("todo", &kanban, "📌").await.unwrap();
    assert!(first.toggle_instance(&card.id, &kanban).await.unwrap());
    first.toggle_favourite(&card.id, &kanban).await.unwrap();
    assert!(first.load_instance(&card.id, &kanban).await.is_ok());

    let reply = first
        .transfer_tasks(&kanban, "todo", json!([{"title": "write"}, {"title": "ship"}]))
        .await
        .unwrap();
    assert_eq!(reply, Some(json!({"received": 2})));
    first.shutdown().await.unwrap();
    assert!(realm.exists(".tessera/main.json"));

    let mut second = Orchestrator::builder(realm.path()).start().await.unwrap();
    let restored = second.instance(&kanban, &card.id).cloned().unwrap();
    assert!(restored.is_placed);
    assert!(restored.is_favored);
    assert_eq!(restored.name, "todo");

    // Persisted cards come back created, so loading works without a new
    // create.
    assert!(second.load_instance(&card.id, &kanban).await.is_ok());
    let column = second
        .channel(&kanban)
        .unwrap()
        .get_data(card.id.as_str())
        .unwrap();
    assert_eq!(column["items"].as_array().unwrap().len(), 2);
    assert_eq!(column["items"][1]["title"], "ship");
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_builtins_are_seeded_once() {
    let realm = TestRealm::new();

    let first = Orchestrator::builder(realm.path()).start().await.unwrap();
    let mut names: Vec<String> = first
        .descriptors()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.name.to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["embed", "image", "kanban", "notebook"]);
    assert_eq!(first.tool_names().len(), 4);
    first.shutdown().await.unwrap();

    let second = Orchestrator::builder(realm.path()).start().await.unwrap();
    assert_eq!(second.descriptors().await.unwrap().len(), 4);
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rename_moves_card_directory_on_disk() {
    let realm = TestRealm::new();
    let notebook = ToolName::from_static("notebook");
    let mut orchestrator = Orchestrator::builder(realm.path()).start().await.unwrap();

    let card = orchestrator.add_instance("draft", &notebook, "📝").await.unwrap();
    realm.write("main/notebook/draft/page.md", "# Draft");

    orchestrator
        .rename_instance(&card.id, &notebook, "final")
        .await
        .unwrap();

    assert!(!realm.exists("main/notebook/draft"));
    assert!(realm.exists("main/notebook/final/page.md"));
    orchestrator.shutdown().await.unwrap();

    let reopened = Orchestrator::builder(realm.path()).start().await.unwrap();
    assert_eq!(reopened.instance(&notebook, &card.id).unwrap().name, "final");
}
