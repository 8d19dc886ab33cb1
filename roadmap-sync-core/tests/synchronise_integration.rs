use roadmap_sync_core::config::{ScanConfig, SyncConfig};
use roadmap_sync_core::contract::{
    MockRecordStore, Record, RecordBody, RecordFields, RemoteError, RemoteId, Status,
};
use roadmap_sync_core::fingerprint::Fingerprint;
use roadmap_sync_core::mapping::{MappingStore, SyncState};
use roadmap_sync_core::scan::scan;
use roadmap_sync_core::synchronise::{synchronise, SyncAction, SyncError};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn record(key: &str, title: &str, fingerprint: &str) -> Record {
    Record {
        key: key.to_string(),
        path: PathBuf::from(key),
        fields: RecordFields {
            title: title.to_string(),
            status: Status::Backlog,
            priority: None,
            complexity: None,
        },
        body: RecordBody::default(),
        fingerprint: Fingerprint::from(fingerprint),
    }
}

fn mapped_state(entries: &[(&str, &str, &str)]) -> SyncState {
    let mut state = SyncState {
        group_remote_id: Some(RemoteId::from("group-1")),
        ..SyncState::default()
    };
    for (key, id, fp) in entries {
        state.set(key, RemoteId::from(*id), Fingerprint::from(*fp));
    }
    state
}

/// Group with a valid persisted id: only the idempotent rename is issued.
fn expect_known_group(store: &mut MockRecordStore) {
    store
        .expect_update_group()
        .withf(|id, name| id.as_str() == "group-1" && name == "Roadmap")
        .times(1)
        .returning(|_, _| Ok(()));
}

fn write_feature(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_export_feature_lifecycle_across_four_runs() {
    let project = tempdir().unwrap();
    let root = project.path().join("roadmap");
    let mapping = MappingStore::new(project.path().join(".roadmap-sync.json"));
    let scan_config = ScanConfig::new(&root);
    let config = SyncConfig::new("Roadmap");

    write_feature(&root, "backlog/001.md", "# Export\n\nExport the board.\n");

    // Run 1: nothing mapped yet, group and record are created.
    let mut store = MockRecordStore::new();
    store
        .expect_find_group_by_name()
        .times(1)
        .returning(|_| Ok(None));
    store
        .expect_create_group()
        .withf(|name| name == "Roadmap")
        .times(1)
        .returning(|_| Ok(RemoteId::from("group-1")));
    store
        .expect_find_record_by_title_and_group()
        .withf(|title, group| title == "Export" && group.as_str() == "group-1")
        .times(1)
        .returning(|_, _| Ok(None));
    store
        .expect_create_record()
        .withf(|group, fields, _| group.as_str() == "group-1" && fields.status == Status::Backlog)
        .times(1)
        .returning(|_, _, _| Ok(RemoteId::from("page-1")));

    let records = scan(&scan_config).records;
    let mut state = mapping.load();
    let report = synchronise(&config, &store, &records, &mut state)
        .await
        .expect("first run should succeed");
    mapping.save(&state).unwrap();
    assert_eq!(report.created(), 1);
    assert_eq!(state.remote_ids.len(), 1);
    assert_eq!(state.fingerprints["001.md"], records[0].fingerprint);
    assert!(state.last_sync_timestamp.is_some());

    // Run 2: file untouched, only the existence probe runs.
    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store
        .expect_get_record()
        .withf(|id| id.as_str() == "page-1")
        .times(1)
        .returning(|_| Ok(true));

    let records = scan(&scan_config).records;
    let mut state = mapping.load();
    let report = synchronise(&config, &store, &records, &mut state)
        .await
        .expect("second run should succeed");
    mapping.save(&state).unwrap();
    assert_eq!(report.unchanged(), 1);
    assert_eq!(report.created() + report.updated(), 0);

    // Run 3: moved to completed, one update carrying the new status.
    fs::create_dir_all(root.join("completed")).unwrap();
    fs::rename(root.join("backlog/001.md"), root.join("completed/001.md")).unwrap();

    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store
        .expect_update_record()
        .withf(|id, group, fields, _| {
            id.as_str() == "page-1"
                && group.as_str() == "group-1"
                && fields.status == Status::Completed
        })
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let records = scan(&scan_config).records;
    let mut state = mapping.load();
    let report = synchronise(&config, &store, &records, &mut state)
        .await
        .expect("third run should succeed");
    mapping.save(&state).unwrap();
    assert_eq!(report.updated(), 1);
    assert_eq!(state.remote_ids["001.md"], RemoteId::from("page-1"));

    // Run 4: file deleted, one archive and the entry is gone.
    fs::remove_file(root.join("completed/001.md")).unwrap();

    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store
        .expect_archive_record()
        .withf(|id| id.as_str() == "page-1")
        .times(1)
        .returning(|_| Ok(()));

    let records = scan(&scan_config).records;
    let mut state = mapping.load();
    let report = synchronise(&config, &store, &records, &mut state)
        .await
        .expect("fourth run should succeed");
    mapping.save(&state).unwrap();
    assert_eq!(report.archived, vec!["001.md".to_string()]);
    assert!(mapping.load().remote_ids.is_empty());
    assert!(mapping.load().fingerprints.is_empty());
}

#[tokio::test]
async fn test_unchanged_records_issue_no_mutations() {
    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store.expect_get_record().times(3).returning(|_| Ok(true));

    let records = vec![
        record("a.md", "A", "fa"),
        record("b.md", "B", "fb"),
        record("c.md", "C", "fc"),
    ];
    let mut state = mapped_state(&[
        ("a.md", "p-a", "fa"),
        ("b.md", "p-b", "fb"),
        ("c.md", "p-c", "fc"),
    ]);
    let before = state.remote_ids.clone();

    let report = synchronise(&SyncConfig::new("Roadmap"), &store, &records, &mut state)
        .await
        .unwrap();
    assert_eq!(report.unchanged(), 3);
    assert_eq!(report.errors(), 0);
    assert_eq!(state.remote_ids, before);
}

#[tokio::test]
async fn test_probe_error_counts_as_failure_and_keeps_mapping() {
    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store
        .expect_get_record()
        .withf(|id| id.as_str() == "p-a")
        .times(1)
        .returning(|_| Err(RemoteError::Transport("connection reset".into())));

    let records = vec![record("a.md", "A", "fa")];
    let mut state = mapped_state(&[("a.md", "p-a", "fa")]);
    let before = state.entry("a.md");

    let report = synchronise(&SyncConfig::new("Roadmap"), &store, &records, &mut state)
        .await
        .unwrap();
    assert_eq!(report.errors(), 1);
    assert_eq!(report.failures[0].key, "a.md");
    assert!(report.outcomes.is_empty());
    assert_eq!(state.entry("a.md"), before);
}

#[tokio::test]
async fn test_archive_failure_still_drops_mapping_entry() {
    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store
        .expect_archive_record()
        .times(2)
        .returning(|id| {
            if id.as_str() == "p-gone" {
                Err(RemoteError::Status {
                    status: 400,
                    message: "already archived".into(),
                })
            } else {
                Ok(())
            }
        });

    let mut state = mapped_state(&[("gone.md", "p-gone", "f1"), ("old.md", "p-old", "f2")]);
    let report = synchronise(&SyncConfig::new("Roadmap"), &store, &[], &mut state)
        .await
        .unwrap();

    assert_eq!(report.archived.len(), 2);
    assert!(state.remote_ids.is_empty());
    assert!(state.fingerprints.is_empty());
}

#[tokio::test]
async fn test_stale_group_id_falls_back_to_name_search() {
    let mut store = MockRecordStore::new();
    store
        .expect_update_group()
        .times(1)
        .returning(|_, _| Err(RemoteError::NotFound));
    store
        .expect_find_group_by_name()
        .withf(|name| name == "Roadmap")
        .times(1)
        .returning(|_| Ok(Some(RemoteId::from("group-2"))));

    let mut state = mapped_state(&[]);
    let report = synchronise(&SyncConfig::new("Roadmap"), &store, &[], &mut state)
        .await
        .unwrap();
    assert_eq!(report.group_id, RemoteId::from("group-2"));
    assert_eq!(state.group_remote_id, Some(RemoteId::from("group-2")));
}

#[tokio::test]
async fn test_group_failure_is_fatal_before_record_writes() {
    let mut store = MockRecordStore::new();
    store
        .expect_find_group_by_name()
        .times(1)
        .returning(|_| Err(RemoteError::Transport("connection refused".into())));

    let mut state = SyncState::default();
    let result = synchronise(
        &SyncConfig::new("Roadmap"),
        &store,
        &[record("a.md", "A", "fa")],
        &mut state,
    )
    .await;
    assert!(matches!(result, Err(SyncError::Group { .. })));
    assert!(state.remote_ids.is_empty());
}

#[tokio::test]
async fn test_remotely_deleted_record_is_recreated() {
    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store.expect_get_record().times(1).returning(|_| Ok(false));
    store
        .expect_find_record_by_title_and_group()
        .times(1)
        .returning(|_, _| Ok(None));
    store
        .expect_create_record()
        .times(1)
        .returning(|_, _, _| Ok(RemoteId::from("p-new")));

    let mut state = mapped_state(&[("a.md", "p-old", "fa")]);
    let report = synchronise(
        &SyncConfig::new("Roadmap"),
        &store,
        &[record("a.md", "A", "fa")],
        &mut state,
    )
    .await
    .unwrap();
    assert_eq!(report.outcomes[0].action, SyncAction::Created);
    assert_eq!(state.remote_ids["a.md"], RemoteId::from("p-new"));
}

#[tokio::test]
async fn test_persisted_id_is_preferred_over_title_search() {
    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    // no find_record_by_title_and_group expectation: a search would panic the mock
    store
        .expect_update_record()
        .withf(|id, _, _, _| id.as_str() == "p-a")
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let mut state = mapped_state(&[("a.md", "p-a", "old")]);
    let report = synchronise(
        &SyncConfig::new("Roadmap"),
        &store,
        &[record("a.md", "Duplicate title", "new")],
        &mut state,
    )
    .await
    .unwrap();
    assert_eq!(report.updated(), 1);
    assert_eq!(state.fingerprints["a.md"], Fingerprint::from("new"));
}

#[tokio::test]
async fn test_stale_record_id_on_update_falls_back_to_title_search() {
    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store
        .expect_update_record()
        .withf(|id, _, _, _| id.as_str() == "p-stale")
        .times(1)
        .returning(|_, _, _, _| Err(RemoteError::NotFound));
    store
        .expect_find_record_by_title_and_group()
        .times(1)
        .returning(|_, _| Ok(Some(RemoteId::from("p-found"))));
    store
        .expect_update_record()
        .withf(|id, _, _, _| id.as_str() == "p-found")
        .times(1)
        .returning(|_, _, _, _| Ok(()));

    let mut state = mapped_state(&[("a.md", "p-stale", "old")]);
    let report = synchronise(
        &SyncConfig::new("Roadmap"),
        &store,
        &[record("a.md", "A", "new")],
        &mut state,
    )
    .await
    .unwrap();
    assert_eq!(report.updated(), 1);
    assert_eq!(state.remote_ids["a.md"], RemoteId::from("p-found"));
}

#[tokio::test]
async fn test_one_failing_record_does_not_abort_the_run() {
    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store
        .expect_find_record_by_title_and_group()
        .times(2)
        .returning(|_, _| Ok(None));
    store
        .expect_create_record()
        .times(2)
        .returning(|_, fields, _| {
            if fields.title == "Broken" {
                Err(RemoteError::RateLimited)
            } else {
                Ok(RemoteId::from("p-ok"))
            }
        });

    let mut state = mapped_state(&[]);
    let report = synchronise(
        &SyncConfig::new("Roadmap"),
        &store,
        &[record("ok.md", "Fine", "f1"), record("bad.md", "Broken", "f2")],
        &mut state,
    )
    .await
    .unwrap();

    assert_eq!(report.created(), 1);
    assert_eq!(report.errors(), 1);
    assert_eq!(report.failures[0].key, "bad.md");
    assert!(state.entry("ok.md").is_some());
    assert!(state.entry("bad.md").is_none());
}

#[tokio::test]
async fn test_absent_attributes_are_passed_through_as_none() {
    let mut store = MockRecordStore::new();
    expect_known_group(&mut store);
    store
        .expect_find_record_by_title_and_group()
        .returning(|_, _| Ok(None));
    store
        .expect_create_record()
        .withf(|_, fields, _| fields.priority.as_deref() == Some("High") && fields.complexity.is_none())
        .times(1)
        .returning(|_, _, _| Ok(RemoteId::from("p-1")));

    let mut rec = record("a.md", "A", "fa");
    rec.fields.priority = Some("High".into());
    let mut state = mapped_state(&[]);
    synchronise(&SyncConfig::new("Roadmap"), &store, &[rec], &mut state)
        .await
        .unwrap();
}
