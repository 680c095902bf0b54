//! Sync engine moving activity records between the local store and the
//! remote activity table.
//!
//! Every public operation is total: failures come back as a [`SyncOutcome`]
//! variant and nothing is raised past this module. The engine never retries;
//! retry policy belongs to the scheduler.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::activity::{NewActivity, SyncStatus};
use crate::error::DatabaseError;
use crate::sync::ports::{
    ActivityStore, AuthOracle, ConnectivityOracle, CursorStore, RemoteActivityStore,
};
use crate::sync::remote_codec::{
    accepted_remote_id, back_reference, payload_from_row, synced_at, to_remote,
    RemoteActivityRow,
};
use crate::sync::types::SyncOutcome;

/// Result of a pull, before the cursor is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PullReport {
    pub outcome: SyncOutcome,
    /// Where the next incremental pull should resume, if it can move forward.
    pub next_cursor: Option<DateTime<Utc>>,
}

enum RowResult {
    Inserted,
    AlreadyKnown,
    Failed,
}

/// Sync engine managing push and pull of activity records.
pub struct SyncEngine {
    store: Arc<dyn ActivityStore>,
    remote: Arc<dyn RemoteActivityStore>,
    connectivity: Arc<dyn ConnectivityOracle>,
    auth: Arc<dyn AuthOracle>,
    cursor: Option<Arc<dyn CursorStore>>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        remote: Arc<dyn RemoteActivityStore>,
        connectivity: Arc<dyn ConnectivityOracle>,
        auth: Arc<dyn AuthOracle>,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            auth,
            cursor: None,
        }
    }

    /// Persist the pull high-water mark in `cursor`.
    pub fn with_cursor_store(mut self, cursor: Arc<dyn CursorStore>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Network, then configuration, then identity. Yields the user id.
    fn check_preconditions(&self) -> Result<String, SyncOutcome> {
        if !self.connectivity.is_available() {
            tracing::debug!("network unavailable");
            return Err(SyncOutcome::NoNetwork);
        }
        if !self.remote.is_configured() {
            tracing::debug!("remote store not configured");
            return Err(SyncOutcome::NotConfigured);
        }
        match self.auth.current_user_id() {
            Some(user_id) if !user_id.trim().is_empty() => Ok(user_id),
            _ => {
                tracing::debug!("no signed-in user");
                Err(SyncOutcome::NotAuthenticated)
            }
        }
    }

    /// Upload every `PENDING` record.
    ///
    /// Records are submitted one at a time. A failed record is logged and
    /// stays `PENDING`; the count covers only records the remote accepted
    /// and the local store marked `SYNCED`.
    #[tracing::instrument(name = "push", skip_all)]
    pub async fn push_pending(&self) -> SyncOutcome {
        let user_id = match self.check_preconditions() {
            Ok(user_id) => user_id,
            Err(outcome) => return outcome,
        };

        let pending = match self.store.list_by_sync_status(SyncStatus::Pending).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(error = %e, "failed to list pending records");
                return SyncOutcome::error(format!("listing pending records: {e}"));
            }
        };
        if pending.is_empty() {
            tracing::debug!("nothing to push");
            return SyncOutcome::success(0);
        }

        let mut pushed = 0;
        for record in &pending {
            let local_id = record.local_id;
            let row = match self.remote.insert(&to_remote(record, &user_id)).await {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(local_id, error = %e, "remote insert failed");
                    continue;
                }
            };
            let remote_id = match accepted_remote_id(&row) {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(local_id, error = %e, "unusable insert response");
                    continue;
                }
            };
            let synced = match record.mark_synced(remote_id, Utc::now()) {
                Ok(synced) => synced,
                Err(e) => {
                    tracing::warn!(local_id, error = %e, "cannot mark record synced");
                    continue;
                }
            };
            // The remote row exists now; if this write fails the record is
            // submitted again next cycle.
            if let Err(e) = self.store.update(&synced).await {
                tracing::warn!(local_id, remote_id, error = %e, "local update failed after remote insert");
                continue;
            }
            tracing::debug!(local_id, remote_id, "record synced");
            pushed += 1;
        }

        tracing::info!(count = pushed, pending = pending.len(), "push finished");
        SyncOutcome::success(pushed)
    }

    /// Download the user's rows with a server sync time after `cursor`.
    pub async fn pull_since(&self, cursor: DateTime<Utc>) -> SyncOutcome {
        self.pull(cursor).await.outcome
    }

    /// Pull from the stored cursor (the Unix epoch if none) and advance it
    /// on success. Without a cursor store every call pulls from the epoch.
    pub async fn pull_incremental(&self) -> SyncOutcome {
        let cursor = match &self.cursor {
            Some(store) => match store.load_pull_cursor().await {
                Ok(cursor) => cursor,
                Err(e) => {
                    tracing::error!(error = %e, "failed to load pull cursor");
                    return SyncOutcome::error(format!("loading pull cursor: {e}"));
                }
            },
            None => None,
        };

        let report = self.pull(cursor.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)).await;
        if let (Some(store), Some(next)) = (&self.cursor, report.next_cursor) {
            if cursor.map_or(true, |current| next > current) {
                if let Err(e) = store.save_pull_cursor(next).await {
                    tracing::warn!(error = %e, "failed to save pull cursor");
                }
            }
        }
        report.outcome
    }

    /// Pull and report how far the cursor may advance.
    ///
    /// Rows that fail locally are skipped and the cursor stops short of the
    /// earliest of them, so they are fetched again next time.
    #[tracing::instrument(name = "pull", skip_all, fields(cursor = %cursor))]
    pub async fn pull(&self, cursor: DateTime<Utc>) -> PullReport {
        let user_id = match self.check_preconditions() {
            Ok(user_id) => user_id,
            Err(outcome) => {
                return PullReport {
                    outcome,
                    next_cursor: None,
                }
            }
        };

        let rows = match self.remote.query_synced_after(&user_id, cursor).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "remote query failed");
                return PullReport {
                    outcome: SyncOutcome::error(format!("querying remote records: {e}")),
                    next_cursor: None,
                };
            }
        };

        let mut created = 0;
        let mut observed = Vec::with_capacity(rows.len());
        for row in &rows {
            let result = self.apply_remote_row(row).await;
            if matches!(result, RowResult::Inserted) {
                created += 1;
            }
            if let Some(at) = synced_at(row) {
                observed.push((at, !matches!(result, RowResult::Failed)));
            }
        }

        tracing::info!(count = created, fetched = rows.len(), "pull finished");
        PullReport {
            outcome: SyncOutcome::success(created),
            next_cursor: advance_cursor(&observed),
        }
    }

    async fn apply_remote_row(&self, row: &RemoteActivityRow) -> RowResult {
        match self.find_local_match(row).await {
            Ok(true) => return RowResult::AlreadyKnown,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(remote_id = %row.id, error = %e, "local lookup failed");
                return RowResult::Failed;
            }
        }

        let payload = match payload_from_row(row) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(remote_id = %row.id, error = %e, "skipping undecodable row");
                return RowResult::Failed;
            }
        };
        match self
            .store
            .insert(NewActivity::from_remote(payload, row.id.clone()))
            .await
        {
            Ok(local_id) => {
                tracing::debug!(local_id, remote_id = %row.id, "remote record stored");
                RowResult::Inserted
            }
            Err(e) => {
                tracing::warn!(remote_id = %row.id, error = %e, "local insert failed");
                RowResult::Failed
            }
        }
    }

    /// Whether `row` is already represented locally.
    ///
    /// A back-reference only counts when the local record is not tied to a
    /// different remote row, since another device may have used the same
    /// local id. Existing matches are left untouched.
    async fn find_local_match(&self, row: &RemoteActivityRow) -> Result<bool, DatabaseError> {
        if let Some(local_id) = back_reference(row) {
            if let Some(local) = self.store.get_by_local_id(local_id).await? {
                match local.remote_id.as_deref() {
                    None => return Ok(true),
                    Some(id) if id == row.id => return Ok(true),
                    Some(_) => {}
                }
            }
        }
        Ok(self.store.get_by_remote_id(&row.id).await?.is_some())
    }

    /// Records waiting for upload.
    ///
    /// # Errors
    /// Returns an error if the local store cannot be read.
    pub async fn pending_count(&self) -> Result<usize, DatabaseError> {
        self.store.count_by_sync_status(SyncStatus::Pending).await
    }

    /// Stored pull cursor, if a cursor store is attached.
    ///
    /// # Errors
    /// Returns an error if the cursor store cannot be read.
    pub async fn pull_cursor(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        match &self.cursor {
            Some(store) => store.load_pull_cursor().await,
            None => Ok(None),
        }
    }
}

/// Highest `synced_at` that can be committed: every row at or below it was
/// handled. `observed` pairs each row's sync time with whether it was handled.
pub(crate) fn advance_cursor(observed: &[(DateTime<Utc>, bool)]) -> Option<DateTime<Utc>> {
    let first_failure = observed
        .iter()
        .filter(|(_, handled)| !handled)
        .map(|(at, _)| *at)
        .min();
    observed
        .iter()
        .filter(|(at, handled)| *handled && first_failure.map_or(true, |f| *at < f))
        .map(|(at, _)| *at)
        .max()
}
