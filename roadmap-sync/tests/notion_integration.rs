//! Live round trip against a real Notion workspace.
//!
//! Needs NOTION_TOKEN, NOTION_PROJECTS_DATABASE_ID and NOTION_FEATURES_DATABASE_ID
//! (a `.env` at the workspace root works). Run with `cargo test -- --ignored`.

use roadmap_sync::load_config::Credentials;
use roadmap_sync::notion::NotionClient;
use roadmap_sync_core::contract::{RecordBody, RecordFields, RecordStore, Status, Subtask};
use serial_test::serial;
use std::path::Path;

fn ensure_env_loaded_from_workspace() {
    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        let env_path = Path::new(&manifest_dir).join("../.env");
        let _ = dotenvy::from_path(env_path);
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires a Notion workspace and credentials"]
async fn test_feature_page_lifecycle() {
    ensure_env_loaded_from_workspace();
    let credentials = Credentials::from_env().expect("Notion credentials in env");
    let client = NotionClient::new(&credentials).expect("client builds");

    let group_name = "roadmap-sync integration test";
    let group_id = match client.find_group_by_name(group_name).await.unwrap() {
        Some(id) => id,
        None => client.create_group(group_name).await.unwrap(),
    };

    let fields = RecordFields {
        title: "Integration export".into(),
        status: Status::Backlog,
        priority: Some("Low".into()),
        complexity: None,
    };
    let body = RecordBody {
        description: Some("Created by the integration test.".into()),
        subtasks: vec![Subtask {
            text: "first step".into(),
            completed: false,
            phase: Some("Phase 1".into()),
        }],
    };

    let id = client.create_record(&group_id, &fields, &body).await.unwrap();
    assert!(client.get_record(&id).await.unwrap());

    let found = client
        .find_record_by_title_and_group(&fields.title, &group_id)
        .await
        .unwrap();
    assert_eq!(found.as_ref(), Some(&id));

    let moved = RecordFields {
        status: Status::Completed,
        ..fields.clone()
    };
    client.update_record(&id, &group_id, &moved, &body).await.unwrap();

    client.archive_record(&id).await.unwrap();
    assert!(!client.get_record(&id).await.unwrap());
    // archiving twice is tolerated
    client.archive_record(&id).await.unwrap();
}
