//! End-to-end sync tests: SQLite store + REST client against a mock server.

use std::sync::Arc;

use mockito::Matcher;
use waterlog_core::storage::RemoteConfig;
use waterlog_core::sync::{
    ActivityStore, ConnectivityFlag, CursorStore, FixedSession, RestActivityStore, SyncEngine,
    SyncWorker, WorkResult,
};
use waterlog_core::{
    ActivityDb, ActivityPayload, ActivityType, NewActivity, SyncOutcome, SyncStatus, WaterSource,
};

struct Setup {
    db: Arc<ActivityDb>,
    network: Arc<ConnectivityFlag>,
    engine: Arc<SyncEngine>,
    _dir: tempfile::TempDir,
}

fn setup(server_url: &str) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(ActivityDb::open_at(&dir.path().join("waterlog.db")).unwrap());
    let session = Arc::new(FixedSession::signed_in("user-1").with_token("jwt"));
    let remote = RestActivityStore::new(
        RemoteConfig {
            url: server_url.to_string(),
            api_key: "anon".to_string(),
            ..RemoteConfig::default()
        },
        session.clone(),
    )
    .unwrap();
    let network = Arc::new(ConnectivityFlag::new(true));
    let engine = Arc::new(
        SyncEngine::new(db.clone(), Arc::new(remote), network.clone(), session)
            .with_cursor_store(db.clone()),
    );
    Setup {
        db,
        network,
        engine,
        _dir: dir,
    }
}

fn inserted_row(id: &str, local_id: i64) -> String {
    serde_json::json!([{
        "id": id,
        "user_id": "user-1",
        "activity_type": "SHOWER",
        "liters_used": 45.0,
        "duration_minutes": 5,
        "water_source": "SHOWER",
        "is_eco_mode": true,
        "timestamp": "2025-04-01T07:00:00.000Z",
        "local_id": local_id.to_string(),
        "synced_at": "2025-04-01T07:00:02.000Z"
    }])
    .to_string()
}

#[tokio::test]
async fn cold_start_push_marks_records_synced() {
    let mut server = mockito::Server::new_async().await;
    let s = setup(&server.url());

    let payload = ActivityPayload::new(ActivityType::Shower, 45.0)
        .with_duration_seconds(300)
        .with_water_source(WaterSource::Shower)
        .with_eco_mode(true);
    let first = s.db.insert(NewActivity::pending(payload.clone())).await.unwrap();
    let second = s.db.insert(NewActivity::pending(payload)).await.unwrap();

    let m1 = server
        .mock("POST", "/rest/v1/water_activities")
        .match_body(Matcher::PartialJson(
            serde_json::json!({ "local_id": first.to_string() }),
        ))
        .with_status(201)
        .with_body(inserted_row("srv-1", first))
        .create_async()
        .await;
    let m2 = server
        .mock("POST", "/rest/v1/water_activities")
        .match_body(Matcher::PartialJson(
            serde_json::json!({ "local_id": second.to_string() }),
        ))
        .with_status(201)
        .with_body(inserted_row("srv-2", second))
        .create_async()
        .await;

    assert_eq!(s.engine.push_pending().await, SyncOutcome::success(2));
    m1.assert_async().await;
    m2.assert_async().await;

    let one = s.db.get_by_local_id(first).await.unwrap().unwrap();
    assert_eq!(one.sync_status, SyncStatus::Synced);
    assert_eq!(one.remote_id.as_deref(), Some("srv-1"));
    let two = s.db.get_by_remote_id("srv-2").await.unwrap().unwrap();
    assert_eq!(two.local_id, second);

    // Nothing left to send.
    assert_eq!(s.engine.push_pending().await, SyncOutcome::success(0));
}

#[tokio::test]
async fn rejected_record_stays_pending_until_next_push() {
    let mut server = mockito::Server::new_async().await;
    let s = setup(&server.url());

    let ok = s
        .db
        .insert(NewActivity::pending(ActivityPayload::new(ActivityType::Tap, 1.0)))
        .await
        .unwrap();
    let bad = s
        .db
        .insert(NewActivity::pending(ActivityPayload::new(ActivityType::Tap, 2.0)))
        .await
        .unwrap();

    server
        .mock("POST", "/rest/v1/water_activities")
        .match_body(Matcher::PartialJson(
            serde_json::json!({ "local_id": ok.to_string() }),
        ))
        .with_status(201)
        .with_body(inserted_row("srv-ok", ok))
        .create_async()
        .await;
    server
        .mock("POST", "/rest/v1/water_activities")
        .match_body(Matcher::PartialJson(
            serde_json::json!({ "local_id": bad.to_string() }),
        ))
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    assert_eq!(s.engine.push_pending().await, SyncOutcome::success(1));
    let pending = s.db.list_by_sync_status(SyncStatus::Pending).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].local_id, bad);
}

#[tokio::test]
async fn offline_cycle_touches_nothing_and_retries() {
    let server = mockito::Server::new_async().await;
    let s = setup(&server.url());
    s.db
        .insert(NewActivity::pending(ActivityPayload::new(ActivityType::Laundry, 60.0)))
        .await
        .unwrap();
    s.network.set(false);

    let worker = SyncWorker::new(s.engine.clone());
    assert_eq!(worker.run_cycle().await, WorkResult::Retry);
    assert_eq!(
        s.db.count_by_sync_status(SyncStatus::Pending).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn pull_stores_remote_rows_once_and_advances_cursor() {
    let mut server = mockito::Server::new_async().await;
    let s = setup(&server.url());

    let body = serde_json::json!([
        {
            "id": "other-1",
            "user_id": "user-1",
            "activity_type": "GARDEN",
            "liters_used": 120.0,
            "duration_minutes": 15,
            "timestamp": "2025-04-02T19:00:00.000Z",
            "local_id": "77",
            "synced_at": "2025-04-02T19:00:03.000Z"
        },
        {
            "id": "other-2",
            "user_id": "user-1",
            "activity_type": "DISHES",
            "liters_used": 9.0,
            "timestamp": "2025-04-02T20:00:00.000Z",
            "synced_at": "2025-04-02T20:00:01.000Z"
        }
    ])
    .to_string();
    let mock = server
        .mock("GET", "/rest/v1/water_activities")
        .match_query(Matcher::UrlEncoded("user_id".into(), "eq.user-1".into()))
        .with_status(200)
        .with_body(body)
        .expect(2)
        .create_async()
        .await;

    assert_eq!(s.engine.pull_incremental().await, SyncOutcome::success(2));
    // A server that ignores the cursor returns the same rows; none are duplicated.
    assert_eq!(s.engine.pull_incremental().await, SyncOutcome::success(0));
    mock.assert_async().await;

    let garden = s.db.get_by_remote_id("other-1").await.unwrap().unwrap();
    assert_eq!(garden.sync_status, SyncStatus::Synced);
    assert_eq!(garden.payload.duration_seconds, 900);
    assert_eq!(
        s.db.count_by_sync_status(SyncStatus::Synced).await.unwrap(),
        2
    );

    let cursor = s.db.load_pull_cursor().await.unwrap().unwrap();
    assert_eq!(cursor.to_rfc3339(), "2025-04-02T20:00:01+00:00");
}
