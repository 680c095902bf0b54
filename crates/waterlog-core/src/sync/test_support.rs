//! Fakes shared by the sync unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::activity::{ActivityPayload, ActivityRecord, ActivityType, NewActivity, SyncStatus};
use crate::error::DatabaseError;
use crate::sync::connectivity::ConnectivityFlag;
use crate::sync::memory::MemoryActivityStore;
use crate::sync::ports::{ActivityStore, CursorStore, RemoteActivityStore};
use crate::sync::remote_codec::{format_timestamp, RemoteActivity, RemoteActivityRow};
use crate::sync::session::FixedSession;
use crate::sync::sync_engine::SyncEngine;
use crate::sync::types::SyncError;

/// Remote table kept in memory. Counts calls and can fail chosen inserts.
#[derive(Default)]
pub struct FakeRemote {
    pub unconfigured: AtomicBool,
    pub fail_query: AtomicBool,
    /// 1-based insert call numbers that fail.
    pub failing_inserts: Mutex<HashSet<usize>>,
    pub insert_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub accepted: AtomicUsize,
    pub rows: Mutex<Vec<RemoteActivityRow>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_insert_call(&self, call: usize) {
        self.failing_inserts.lock().unwrap().insert(call);
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn seed(&self, row: RemoteActivityRow) {
        self.rows.lock().unwrap().push(row);
    }
}

#[async_trait]
impl RemoteActivityStore for FakeRemote {
    fn is_configured(&self) -> bool {
        !self.unconfigured.load(Ordering::SeqCst)
    }

    async fn insert(&self, activity: &RemoteActivity) -> Result<RemoteActivityRow, SyncError> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_inserts.lock().unwrap().contains(&call) {
            return Err(SyncError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let mut rows = self.rows.lock().unwrap();
        let row = RemoteActivityRow {
            id: format!("remote-{}", rows.len() + 1),
            user_id: activity.user_id.clone(),
            activity_type: activity.activity_type.clone(),
            liters_used: activity.liters_used,
            duration_minutes: activity.duration_minutes,
            water_source: activity.water_source.clone(),
            flow_pressure: activity.flow_pressure.clone(),
            is_eco_mode: activity.is_eco_mode,
            notes: activity.notes.clone(),
            timestamp: activity.timestamp.clone(),
            local_id: activity.local_id.clone(),
            synced_at: Some(format_timestamp(Utc::now())),
        };
        rows.push(row.clone());
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(row)
    }

    async fn query_synced_after(
        &self,
        user_id: &str,
        cursor: DateTime<Utc>,
    ) -> Result<Vec<RemoteActivityRow>, SyncError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(SyncError::Rejected {
                status: 500,
                body: "boom".into(),
            });
        }
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| {
                r.synced_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map_or(false, |at| at.with_timezone(&Utc) > cursor)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.synced_at.cmp(&b.synced_at));
        Ok(rows)
    }
}

/// Local store that counts reads and can refuse writes.
#[derive(Default)]
pub struct InstrumentedStore {
    pub inner: MemoryActivityStore,
    pub list_calls: AtomicUsize,
    pub fail_list: AtomicBool,
    pub fail_updates: AtomicBool,
    /// Local ids whose update fails.
    pub failing_update_ids: Mutex<HashSet<i64>>,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActivityRecord> {
        self.inner.snapshot()
    }

    pub fn with_status(&self, status: SyncStatus) -> Vec<ActivityRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.sync_status == status)
            .collect()
    }
}

#[async_trait]
impl ActivityStore for InstrumentedStore {
    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<ActivityRecord>, DatabaseError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed("disk on fire".into()));
        }
        self.inner.list_by_sync_status(status).await
    }

    async fn update(&self, record: &ActivityRecord) -> Result<(), DatabaseError> {
        if self.fail_updates.load(Ordering::SeqCst)
            || self.failing_update_ids.lock().unwrap().contains(&record.local_id)
        {
            return Err(DatabaseError::Locked);
        }
        self.inner.update(record).await
    }

    async fn insert(&self, record: NewActivity) -> Result<i64, DatabaseError> {
        self.inner.insert(record).await
    }

    async fn get_by_local_id(
        &self,
        local_id: i64,
    ) -> Result<Option<ActivityRecord>, DatabaseError> {
        self.inner.get_by_local_id(local_id).await
    }

    async fn get_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<Option<ActivityRecord>, DatabaseError> {
        self.inner.get_by_remote_id(remote_id).await
    }
}

#[async_trait]
impl CursorStore for InstrumentedStore {
    async fn load_pull_cursor(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.inner.load_pull_cursor().await
    }

    async fn save_pull_cursor(&self, cursor: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.inner.save_pull_cursor(cursor).await
    }
}

/// Engine plus handles on every collaborator.
pub struct Harness {
    pub store: Arc<InstrumentedStore>,
    pub remote: Arc<FakeRemote>,
    pub network: Arc<ConnectivityFlag>,
    pub session: Arc<FixedSession>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    /// Online, configured, signed in as `user-1`.
    pub fn new() -> Self {
        let store = Arc::new(InstrumentedStore::new());
        let remote = Arc::new(FakeRemote::new());
        let network = Arc::new(ConnectivityFlag::new(true));
        let session = Arc::new(FixedSession::signed_in("user-1"));
        let engine = Arc::new(
            SyncEngine::new(store.clone(), remote.clone(), network.clone(), session.clone())
                .with_cursor_store(store.clone()),
        );
        Self {
            store,
            remote,
            network,
            session,
            engine,
        }
    }

    pub async fn log(&self, liters: f64) -> i64 {
        self.store
            .insert(NewActivity::pending(ActivityPayload::new(
                ActivityType::Tap,
                liters,
            )))
            .await
            .unwrap()
    }
}

/// A row as another device would have uploaded it.
pub fn remote_row(id: &str, local_id: Option<&str>, synced_at: &str) -> RemoteActivityRow {
    RemoteActivityRow {
        id: id.into(),
        user_id: "user-1".into(),
        activity_type: "GARDEN".into(),
        liters_used: 80.0,
        duration_minutes: Some(10),
        water_source: None,
        flow_pressure: None,
        is_eco_mode: None,
        notes: Some("from the other phone".into()),
        timestamp: "2025-03-01T18:00:00.000Z".into(),
        local_id: local_id.map(str::to_string),
        synced_at: Some(synced_at.into()),
    }
}
