use crate::Database;
use chrono::{TimeZone, Utc};
use std::env;
use std::sync::Arc;
use weather_core::{
    ActivityLog, CoreError, DatabaseError, LogEntry, LogKind, ManualClock, StateStore,
    UploadStatus,
};

async fn setup_test_db() -> Database {
    let db_path = env::temp_dir().join(format!("test_weather_poster_{}.db", uuid::Uuid::new_v4()));
    let db_url = format!("sqlite://{}", db_path.display());

    let mut db = Database::new(db_url);
    db.connect()
        .await
        .expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");

    db
}

#[tokio::test]
async fn test_migrations_are_repeatable() {
    let db = setup_test_db().await;
    db.run_migrations()
        .await
        .expect("Second migration run should be a no-op");
}

#[tokio::test]
async fn test_settings_round_trip_and_overwrite() {
    let db = setup_test_db().await;

    assert_eq!(db.get_setting("missing").await.unwrap(), None);

    db.save_setting("test_key", "test_value")
        .await
        .expect("Failed to save setting");
    db.save_setting("test_key", "newer_value")
        .await
        .expect("Failed to overwrite setting");
    let value = db
        .get_setting("test_key")
        .await
        .expect("Failed to get setting");
    assert_eq!(value, Some("newer_value".to_string()));

    db.delete_setting("test_key").await.unwrap();
    assert_eq!(db.get_setting("test_key").await.unwrap(), None);
}

#[tokio::test]
async fn test_queries_before_connect_fail() {
    let db = Database::new("sqlite::memory:".to_string());
    let error = db.get_setting("anything").await.unwrap_err();
    assert!(matches!(
        error,
        CoreError::Database(DatabaseError::NotConnected)
    ));
}

#[tokio::test]
async fn test_last_post_uri_persists() {
    let db = setup_test_db().await;

    assert_eq!(db.last_post_uri().await.unwrap(), None);
    db.set_last_post_uri("at://did:plc:station/app.bsky.feed.post/1")
        .await
        .unwrap();
    db.set_last_post_uri("at://did:plc:station/app.bsky.feed.post/2")
        .await
        .unwrap();
    assert_eq!(
        db.last_post_uri().await.unwrap().as_deref(),
        Some("at://did:plc:station/app.bsky.feed.post/2")
    );
}

#[tokio::test]
async fn test_logs_survive_reopen() {
    let db_path = env::temp_dir().join(format!("test_weather_poster_{}.db", uuid::Uuid::new_v4()));
    let db_url = format!("sqlite://{}", db_path.display());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
    ));

    {
        let db = Database::open(db_url.clone()).await.unwrap();
        let log = ActivityLog::new(clock.clone());
        log.upload(UploadStatus::Success, "{\"temperature_c\":12.3}");
        log.debug("Post successful: at://post/1");
        log.flush_to(&db).await;
        db.close().await;
    }

    let db = Database::open(db_url).await.unwrap();
    let uploads: Vec<LogEntry> = db.load_log(LogKind::Upload).await.unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].status, Some(UploadStatus::Success));

    let restored = ActivityLog::new(clock);
    restored.load_from(&db).await;
    let debug = restored.debug_entries();
    assert_eq!(debug.len(), 2);
    assert_eq!(debug[1].message, "Post successful: at://post/1");
}
