//! SQLite-based activity storage.
//!
//! Provides persistent storage for:
//! - Logged water activities with their sync metadata
//! - Key-value store for application state (pull cursor)
//!
//! The connection sits behind a mutex and every query runs on tokio's
//! blocking pool, so async callers never stall the runtime on disk I/O.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{data_dir, migrations};
use crate::activity::{
    ActivityPayload, ActivityRecord, FlowPressure, NewActivity, SyncStatus, WaterSource,
};
use crate::error::{CoreError, DatabaseError};
use crate::sync::ports::{ActivityStore, CursorStore};

const PULL_CURSOR_KEY: &str = "sync.pull_cursor";

const SELECT_COLUMNS: &str = "id, activity_type, liters_used, duration_seconds, timestamp, notes,
     water_source, flow_pressure, is_eco_mode, remote_id, sync_status, last_modified";

/// SQLite database for activity storage.
#[derive(Clone)]
pub struct ActivityDb {
    conn: Arc<Mutex<Connection>>,
}

impl ActivityDb {
    /// Open the database at `~/.config/waterlog/waterlog.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("waterlog.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn call<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| DatabaseError::Locked)?;
            f(&guard)
        })
        .await?
    }

    /// Most recent activities first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<ActivityRecord>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM water_activities
                 ORDER BY timestamp DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], map_row)?;
            collect_records(rows)
        })
        .await
    }

    /// Total liters logged in `[from, to)`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn total_liters_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, DatabaseError> {
        self.call(move |conn| {
            let total: f64 = conn.query_row(
                "SELECT COALESCE(SUM(liters_used), 0.0) FROM water_activities
                 WHERE timestamp >= ?1 AND timestamp < ?2",
                params![sql_time(from), sql_time(to)],
                |row| row.get(0),
            )?;
            Ok(total)
        })
        .await
    }
}

/// Fixed-width UTC form, so text ordering matches time ordering.
fn sql_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_rfc3339(column: &str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("{column} '{raw}': {e}")))
}

fn corrupt(message: String) -> DatabaseError {
    DatabaseError::CorruptRow {
        table: "water_activities".into(),
        message,
    }
}

/// Raw column values; enum and time parsing happens in [`RawRow::into_record`].
struct RawRow {
    id: i64,
    activity_type: String,
    liters_used: f64,
    duration_seconds: u32,
    timestamp: String,
    notes: Option<String>,
    water_source: Option<String>,
    flow_pressure: Option<String>,
    is_eco_mode: bool,
    remote_id: Option<String>,
    sync_status: String,
    last_modified: String,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        activity_type: row.get(1)?,
        liters_used: row.get(2)?,
        duration_seconds: row.get(3)?,
        timestamp: row.get(4)?,
        notes: row.get(5)?,
        water_source: row.get(6)?,
        flow_pressure: row.get(7)?,
        is_eco_mode: row.get(8)?,
        remote_id: row.get(9)?,
        sync_status: row.get(10)?,
        last_modified: row.get(11)?,
    })
}

impl RawRow {
    fn into_record(self) -> Result<ActivityRecord, DatabaseError> {
        let invalid = |e: crate::error::ValidationError| corrupt(format!("row {}: {e}", self.id));
        Ok(ActivityRecord {
            local_id: self.id,
            remote_id: self.remote_id.clone(),
            payload: ActivityPayload {
                activity_type: self.activity_type.parse().map_err(invalid)?,
                liters_used: self.liters_used,
                duration_seconds: self.duration_seconds,
                water_source: self.water_source.as_deref().map(WaterSource::from_wire),
                flow_pressure: self.flow_pressure.as_deref().map(FlowPressure::from_wire),
                is_eco_mode: self.is_eco_mode,
                notes: self.notes.clone(),
                timestamp: parse_rfc3339("timestamp", &self.timestamp)?,
            },
            sync_status: self.sync_status.parse().map_err(invalid)?,
            last_modified: parse_rfc3339("last_modified", &self.last_modified)?,
        })
    }
}

fn collect_records<I>(rows: I) -> Result<Vec<ActivityRecord>, DatabaseError>
where
    I: Iterator<Item = rusqlite::Result<RawRow>>,
{
    rows.map(|raw| raw.map_err(DatabaseError::from)?.into_record())
        .collect()
}

fn query_one(
    conn: &Connection,
    filter: &str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<ActivityRecord>, DatabaseError> {
    let raw = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM water_activities WHERE {filter} = ?1"),
            [value],
            map_row,
        )
        .optional()?;
    raw.map(RawRow::into_record).transpose()
}

#[async_trait]
impl ActivityStore for ActivityDb {
    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<ActivityRecord>, DatabaseError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM water_activities
                 WHERE sync_status = ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![status.as_str()], map_row)?;
            collect_records(rows)
        })
        .await
    }

    async fn update(&self, record: &ActivityRecord) -> Result<(), DatabaseError> {
        let record = record.clone();
        self.call(move |conn| {
            let payload = &record.payload;
            let changed = conn.execute(
                "UPDATE water_activities SET
                    activity_type = ?2, liters_used = ?3, duration_seconds = ?4,
                    timestamp = ?5, notes = ?6, water_source = ?7, flow_pressure = ?8,
                    is_eco_mode = ?9, remote_id = COALESCE(remote_id, ?10),
                    sync_status = ?11, last_modified = ?12
                 WHERE id = ?1",
                params![
                    record.local_id,
                    payload.activity_type.as_str(),
                    payload.liters_used,
                    payload.duration_seconds,
                    sql_time(payload.timestamp),
                    payload.notes,
                    payload.water_source.as_ref().map(WaterSource::as_str),
                    payload.flow_pressure.as_ref().map(FlowPressure::as_str),
                    payload.is_eco_mode,
                    record.remote_id,
                    record.sync_status.as_str(),
                    sql_time(record.last_modified),
                ],
            )?;
            if changed == 0 {
                return Err(DatabaseError::QueryFailed(format!(
                    "no activity with id {}",
                    record.local_id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn insert(&self, record: NewActivity) -> Result<i64, DatabaseError> {
        self.call(move |conn| {
            let payload = &record.payload;
            conn.execute(
                "INSERT INTO water_activities (
                    activity_type, liters_used, duration_seconds, timestamp, notes,
                    water_source, flow_pressure, is_eco_mode, remote_id, sync_status, last_modified
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    payload.activity_type.as_str(),
                    payload.liters_used,
                    payload.duration_seconds,
                    sql_time(payload.timestamp),
                    payload.notes,
                    payload.water_source.as_ref().map(WaterSource::as_str),
                    payload.flow_pressure.as_ref().map(FlowPressure::as_str),
                    payload.is_eco_mode,
                    record.remote_id,
                    record.sync_status.as_str(),
                    sql_time(record.last_modified),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_by_local_id(
        &self,
        local_id: i64,
    ) -> Result<Option<ActivityRecord>, DatabaseError> {
        self.call(move |conn| query_one(conn, "id", &local_id)).await
    }

    async fn get_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<Option<ActivityRecord>, DatabaseError> {
        let remote_id = remote_id.to_string();
        self.call(move |conn| query_one(conn, "remote_id", &remote_id))
            .await
    }

    async fn count_by_sync_status(&self, status: SyncStatus) -> Result<usize, DatabaseError> {
        self.call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM water_activities WHERE sync_status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}

#[async_trait]
impl CursorStore for ActivityDb {
    async fn load_pull_cursor(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        self.call(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![PULL_CURSOR_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|value| {
                DateTime::parse_from_rfc3339(&value)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| DatabaseError::CorruptRow {
                        table: "kv".into(),
                        message: format!("{PULL_CURSOR_KEY} '{value}': {e}"),
                    })
            })
            .transpose()
        })
        .await
    }

    async fn save_pull_cursor(&self, cursor: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![PULL_CURSOR_KEY, sql_time(cursor)],
            )?;
            Ok(())
        })
        .await
    }
}
