//! Collaborator interfaces consumed by the sync engine and scheduler.
//!
//! Everything the engine touches comes in through one of these traits, so
//! the engine can be composed explicitly at startup and driven by fakes in
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::activity::{ActivityRecord, NewActivity, SyncStatus};
use crate::error::DatabaseError;
use crate::sync::remote_codec::{RemoteActivity, RemoteActivityRow};
use crate::sync::types::SyncError;

/// Durable local storage of activity records.
///
/// Implementations must make each single-record write atomic and allow
/// concurrent readers while a writer is active.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// All records currently in `status`.
    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<ActivityRecord>, DatabaseError>;

    /// Overwrite the stored record with the same `local_id`.
    ///
    /// A stored `remote_id` is never replaced.
    async fn update(&self, record: &ActivityRecord) -> Result<(), DatabaseError>;

    /// Store a new record, returning its freshly assigned local id.
    async fn insert(&self, record: NewActivity) -> Result<i64, DatabaseError>;

    async fn get_by_local_id(&self, local_id: i64)
        -> Result<Option<ActivityRecord>, DatabaseError>;

    async fn get_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<Option<ActivityRecord>, DatabaseError>;

    async fn count_by_sync_status(&self, status: SyncStatus) -> Result<usize, DatabaseError> {
        Ok(self.list_by_sync_status(status).await?.len())
    }
}

/// Persistent high-water mark for incremental pulls.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_pull_cursor(&self) -> Result<Option<DateTime<Utc>>, DatabaseError>;
    async fn save_pull_cursor(&self, cursor: DateTime<Utc>) -> Result<(), DatabaseError>;
}

/// Cloud-hosted activity table, scoped by user.
#[async_trait]
pub trait RemoteActivityStore: Send + Sync {
    /// Whether the backend has the URL/credentials it needs. Checked before
    /// any request is made.
    fn is_configured(&self) -> bool;

    /// Insert one row, returning the stored representation.
    async fn insert(&self, activity: &RemoteActivity) -> Result<RemoteActivityRow, SyncError>;

    /// Rows of `user_id` whose server-side `synced_at` is after `cursor`.
    async fn query_synced_after(
        &self,
        user_id: &str,
        cursor: DateTime<Utc>,
    ) -> Result<Vec<RemoteActivityRow>, SyncError>;
}

/// Reports outbound network availability. Asked on every attempt from
/// async code, so it must return without blocking or doing I/O.
pub trait ConnectivityOracle: Send + Sync {
    fn is_available(&self) -> bool;
}

/// Reports whether the device is short on battery.
pub trait PowerOracle: Send + Sync {
    fn is_battery_low(&self) -> bool;
}

/// Who is signed in, if anyone.
pub trait AuthOracle: Send + Sync {
    /// `None` means anonymous.
    fn current_user_id(&self) -> Option<String>;

    /// Bearer token for the signed-in user, when the backend wants one.
    fn access_token(&self) -> Option<String> {
        None
    }
}

/// Power source for hosts without a battery.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPowered;

impl PowerOracle for AlwaysPowered {
    fn is_battery_low(&self) -> bool {
        false
    }
}
