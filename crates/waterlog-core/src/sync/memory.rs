//! In-memory activity store, for tests and ephemeral runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::activity::{ActivityRecord, NewActivity, SyncStatus};
use crate::error::DatabaseError;
use crate::sync::ports::{ActivityStore, CursorStore};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    records: BTreeMap<i64, ActivityRecord>,
    pull_cursor: Option<DateTime<Utc>>,
}

/// [`ActivityStore`] and [`CursorStore`] held in process memory.
///
/// Ids are monotonic and never reused, matching the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryActivityStore {
    state: Mutex<State>,
}

impl MemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, ordered by local id.
    pub fn snapshot(&self) -> Vec<ActivityRecord> {
        self.state
            .lock()
            .map(|s| s.records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn remove(&self, local_id: i64) -> Option<ActivityRecord> {
        self.state.lock().ok()?.records.remove(&local_id)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, DatabaseError> {
        let mut state = self.state.lock().map_err(|_| DatabaseError::Locked)?;
        Ok(f(&mut state))
    }
}

#[async_trait]
impl ActivityStore for MemoryActivityStore {
    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<ActivityRecord>, DatabaseError> {
        self.with_state(|s| {
            s.records
                .values()
                .filter(|r| r.sync_status == status)
                .cloned()
                .collect()
        })
    }

    async fn update(&self, record: &ActivityRecord) -> Result<(), DatabaseError> {
        self.with_state(|s| {
            let stored = s.records.get_mut(&record.local_id).ok_or_else(|| {
                DatabaseError::QueryFailed(format!("no activity with id {}", record.local_id))
            })?;
            let remote_id = stored.remote_id.clone().or_else(|| record.remote_id.clone());
            *stored = ActivityRecord {
                remote_id,
                ..record.clone()
            };
            Ok(())
        })?
    }

    async fn insert(&self, record: NewActivity) -> Result<i64, DatabaseError> {
        self.with_state(|s| {
            if let Some(remote_id) = record.remote_id.as_deref() {
                if s.records
                    .values()
                    .any(|r| r.remote_id.as_deref() == Some(remote_id))
                {
                    return Err(DatabaseError::QueryFailed(format!(
                        "remote id {remote_id} already stored"
                    )));
                }
            }
            s.next_id += 1;
            let id = s.next_id;
            s.records.insert(id, record.into_record(id));
            Ok(id)
        })?
    }

    async fn get_by_local_id(
        &self,
        local_id: i64,
    ) -> Result<Option<ActivityRecord>, DatabaseError> {
        self.with_state(|s| s.records.get(&local_id).cloned())
    }

    async fn get_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<Option<ActivityRecord>, DatabaseError> {
        self.with_state(|s| {
            s.records
                .values()
                .find(|r| r.remote_id.as_deref() == Some(remote_id))
                .cloned()
        })
    }
}

#[async_trait]
impl CursorStore for MemoryActivityStore {
    async fn load_pull_cursor(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.with_state(|s| s.pull_cursor)
    }

    async fn save_pull_cursor(&self, cursor: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.with_state(|s| s.pull_cursor = Some(cursor))
    }
}
