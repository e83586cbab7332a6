//! Autosave and version history against in-memory and SQLite storage

use std::sync::Arc;
use std::time::Duration;

use cd_api_contract::ConfigTarget;
use cd_core::autosave::{draft_key, versions_key};
use cd_core::{AutosaveManager, CoreConfig, DraftStorage, LocalDbStorage, MemoryStorage, SaveStatus};
use cd_local_db::Database;
use cd_rest_client_mock::MockClient;
use tokio::time;

fn target() -> ConfigTarget {
    ConfigTarget::yaml("j1", "tasks")
}

fn manager(storage: Arc<dyn DraftStorage>) -> (AutosaveManager<MockClient>, Arc<MockClient>) {
    let client = Arc::new(MockClient::new().with_content(target(), "canonical"));
    let manager = AutosaveManager::new(client.clone(), storage, &CoreConfig::default());
    (manager, client)
}

#[tokio::test(start_paused = true)]
async fn test_pause_writes_one_draft_and_one_version() {
    let storage = Arc::new(MemoryStorage::new());
    let (mut editor, _client) = manager(storage.clone());
    editor.open(target()).await.unwrap();

    for text in ["c", "ca", "can"] {
        editor.edit(text);
        time::advance(Duration::from_millis(100)).await;
        assert!(!editor.flush_if_due());
    }
    time::advance(Duration::from_millis(700)).await;
    assert!(editor.flush_if_due());

    assert_eq!(storage.writes(&draft_key(&target())), 1);
    assert_eq!(storage.writes(&versions_key(&target())), 1);
    assert_eq!(editor.versions().len(), 1);
    assert_eq!(editor.versions()[0].content, "can");
    assert_eq!(editor.status(), SaveStatus::Autosaved);
}

#[tokio::test(start_paused = true)]
async fn test_run_pending_waits_for_deadline() {
    let storage = Arc::new(MemoryStorage::new());
    let (mut editor, _client) = manager(storage.clone());
    editor.open(target()).await.unwrap();

    editor.edit("draft");
    let started = time::Instant::now();
    assert!(editor.run_pending().await);
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert!(!editor.run_pending().await);
}

#[tokio::test(start_paused = true)]
async fn test_undriven_edit_stays_pending_until_run() {
    let storage = Arc::new(MemoryStorage::new());
    let (mut editor, _client) = manager(storage.clone());
    editor.open(target()).await.unwrap();

    editor.edit("late");
    time::advance(Duration::from_secs(5)).await;
    assert_eq!(storage.writes(&draft_key(&target())), 0);
    assert_eq!(editor.status(), SaveStatus::Pending);

    let started = time::Instant::now();
    assert!(editor.run_pending().await);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(storage.writes(&draft_key(&target())), 1);
    assert_eq!(editor.status(), SaveStatus::Autosaved);
}

#[tokio::test(start_paused = true)]
async fn test_run_pending_in_select_fires_before_slower_branch() {
    let storage = Arc::new(MemoryStorage::new());
    let (mut editor, _client) = manager(storage.clone());
    editor.open(target()).await.unwrap();

    editor.edit("draft");
    let saved = tokio::select! {
        saved = editor.run_pending() => saved,
        _ = time::sleep(Duration::from_secs(10)) => false,
    };
    assert!(saved);
    assert_eq!(storage.writes(&versions_key(&target())), 1);
}

#[tokio::test(start_paused = true)]
async fn test_versions_capped_and_distinct() {
    let storage = Arc::new(MemoryStorage::new());
    let (mut editor, _client) = manager(storage.clone());
    editor.open(target()).await.unwrap();

    for text in ["a", "b", "a", "c", "d", "e", "f", "e"] {
        editor.edit(text);
        editor.flush();
    }

    let contents: Vec<_> = editor.versions().iter().map(|v| v.content.as_str()).collect();
    assert_eq!(contents, vec!["e", "f", "d", "c", "a"]);

    let mut ids: Vec<_> = editor.versions().iter().map(|v| v.id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn test_unchanged_edit_does_not_schedule() {
    let storage = Arc::new(MemoryStorage::new());
    let (mut editor, _client) = manager(storage);
    editor.open(target()).await.unwrap();

    assert!(!editor.edit("canonical"));
    assert!(!editor.debounce().is_pending());
    assert_eq!(editor.status(), SaveStatus::Idle);
}

#[tokio::test]
async fn test_draft_survives_reopen_in_sqlite() {
    let dir = tempfile::TempDir::new().unwrap();
    let db = Database::open(dir.path().join("state.db")).unwrap();

    {
        let (mut editor, _client) = manager(Arc::new(LocalDbStorage::new(db.clone())));
        editor.open(target()).await.unwrap();
        editor.edit("unsaved work");
        editor.flush();
    }

    let (mut editor, client) = manager(Arc::new(LocalDbStorage::new(db)));
    editor.open(target()).await.unwrap();
    assert_eq!(editor.content(), "unsaved work");
    assert_eq!(editor.status(), SaveStatus::Restored);
    assert_eq!(editor.versions().len(), 1);
    assert_eq!(client.content_fetches(), 0);
}

#[tokio::test]
async fn test_malformed_versions_treated_as_empty() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(&versions_key(&target()), "{not json").unwrap();
    let (mut editor, _client) = manager(storage);

    editor.open(target()).await.unwrap();
    assert!(editor.versions().is_empty());
    assert_eq!(editor.content(), "canonical");
}

#[tokio::test]
async fn test_storage_failure_keeps_working_in_memory() {
    let storage = Arc::new(MemoryStorage::new());
    let (mut editor, _client) = manager(storage.clone());
    editor.open(target()).await.unwrap();

    storage.set_failing(true);
    editor.edit("offline edit");
    assert!(editor.flush());

    assert_eq!(editor.versions().len(), 1);
    assert_eq!(editor.status(), SaveStatus::Autosaved);
    assert!(!storage.contains(&draft_key(&target())));
}

#[tokio::test]
async fn test_clear_drafts_refetches_canonical() {
    let storage = Arc::new(MemoryStorage::new());
    let (mut editor, client) = manager(storage.clone());
    editor.open(target()).await.unwrap();
    editor.edit("scratch");
    editor.flush();

    editor.clear_drafts().await.unwrap();
    assert_eq!(editor.content(), "canonical");
    assert!(editor.versions().is_empty());
    assert!(!storage.contains(&draft_key(&target())));
    assert!(!storage.contains(&versions_key(&target())));
    assert_eq!(client.content_fetches(), 2);
}

#[tokio::test]
async fn test_save_failure_is_classified() {
    let storage = Arc::new(MemoryStorage::new());
    let (mut editor, client) = manager(storage);
    editor.open(target()).await.unwrap();
    editor.edit("new");

    client.fail_with(Some(cd_client_api::ClientApiError::Application(
        "Crew j1 not found".into(),
    )));
    let err = editor.save().await.unwrap_err();
    assert_eq!(err.to_string(), "Crew j1 not found");
    assert_ne!(editor.status(), SaveStatus::Saved);
}
