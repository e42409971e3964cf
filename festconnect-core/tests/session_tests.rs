//! End-to-end tests for the session over an on-disk store
//!
//! Covers:
//! - Store creation on first open and reuse across restarts
//! - Profile save → festival creation → profile read
//! - Legacy file import on first start, and no re-import afterwards

use festconnect_core::config::{StoreConfig, LEGACY_FILE};
use festconnect_core::db::models::{NewConnection, ProfileData};
use festconnect_core::db::{current_schema_version, open_file, CURRENT_SCHEMA_VERSION};
use festconnect_core::legacy::{JsonFileLegacyStore, LegacyStore, LEGACY_PROFILE_KEY};
use festconnect_core::{Error, Session, SessionView};
use std::path::Path;
use std::sync::Arc;

fn session_in(dir: &Path) -> Session {
    let legacy = JsonFileLegacyStore::new(dir.join(LEGACY_FILE));
    Session::new(StoreConfig::in_folder(dir)).with_legacy(Arc::new(legacy))
}

#[tokio::test]
async fn test_profile_round_trip_through_session() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(dir.path());

    session.init().await.unwrap();
    session
        .save_profile(&ProfileData {
            name: "A".to_string(),
            festival: "F1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let profile = session.get_profile().await.unwrap().unwrap();
    assert_eq!(profile.name, "A");
    assert_eq!(profile.festival, "F1");

    let current = session.get_current_festival().await.unwrap().unwrap();
    assert_eq!(current.name, "F1");
    assert!(current.is_active);
}

#[tokio::test]
async fn test_data_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let session = session_in(dir.path());
        session
            .save_profile(&ProfileData {
                name: "A".to_string(),
                festival: "F1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        session
            .add_connection(NewConnection {
                name: "Sam".to_string(),
                whatsapp: Some("+1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let reopened = session_in(dir.path());
    let connections = reopened.get_connections().await.unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].name, "Sam");
    assert_eq!(reopened.list_festivals().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_schema_version_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("festconnect.db");

    let store = open_file(&db_path).await.unwrap();
    assert!(db_path.exists(), "Database file was not created");
    assert_eq!(
        current_schema_version(store.pool()).await.unwrap(),
        CURRENT_SCHEMA_VERSION
    );
    store.close().await;

    let store = open_file(&db_path).await.unwrap();
    assert_eq!(
        current_schema_version(store.pool()).await.unwrap(),
        CURRENT_SCHEMA_VERSION
    );
}

#[tokio::test]
async fn test_legacy_file_imported_once() {
    let dir = tempfile::tempdir().unwrap();
    let legacy_path = dir.path().join(LEGACY_FILE);
    std::fs::write(
        &legacy_path,
        serde_json::json!({
            "connections": r#"[{"name":"Sam","whatsapp":"+1","scannedAt":"2024-06-01T10:00:00.000Z"},{"name":"Kim","whatsapp":"+2"}]"#,
            "userProfile": r#"{"name":"Me","festival":"Glade"}"#,
        })
        .to_string(),
    )
    .unwrap();

    let view = SessionView::new(Arc::new(session_in(dir.path())));
    view.load().await;

    let state = view.snapshot().await;
    assert!(state.is_ready);
    assert_eq!(state.connections.len(), 2);
    assert_eq!(state.profile.unwrap().festival, "Glade");

    let legacy = JsonFileLegacyStore::new(&legacy_path);
    assert!(legacy.get_item(LEGACY_PROFILE_KEY).unwrap().is_none());

    let again = session_in(dir.path());
    again.init().await.unwrap();
    assert_eq!(again.list_festivals().await.unwrap().len(), 1);
    assert_eq!(again.get_connections().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_write_without_festival_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(dir.path());

    let result = session
        .add_connection(NewConnection {
            name: "Sam".to_string(),
            ..Default::default()
        })
        .await;
    assert!(matches!(result, Err(Error::NoActiveFestival)));
    assert!(session.get_connections().await.unwrap().is_empty());
}
