//! Encoding/decoding between local activity records and remote table rows.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::{ActivityPayload, ActivityRecord, ActivityType, FlowPressure, WaterSource};
use crate::sync::types::SyncError;

/// Row submitted on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteActivity {
    pub user_id: String,
    pub activity_type: String,
    pub liters_used: f64,
    pub duration_minutes: Option<u32>,
    pub water_source: Option<String>,
    pub flow_pressure: Option<String>,
    pub is_eco_mode: Option<bool>,
    pub notes: Option<String>,
    /// ISO-8601.
    pub timestamp: String,
    /// Back-reference to the originating local record.
    pub local_id: Option<String>,
}

/// Row as stored and returned by the remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteActivityRow {
    pub id: String,
    pub user_id: String,
    pub activity_type: String,
    pub liters_used: f64,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub water_source: Option<String>,
    #[serde(default)]
    pub flow_pressure: Option<String>,
    #[serde(default)]
    pub is_eco_mode: Option<bool>,
    #[serde(default)]
    pub notes: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub local_id: Option<String>,
    /// Set by the server.
    #[serde(default)]
    pub synced_at: Option<String>,
}

/// ISO-8601 in UTC with millisecond precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Pull cursor filter value. Keeps the full microsecond precision the
/// cursor is stored with, so rows at the cursor are not fetched again.
pub fn format_cursor(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, SyncError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SyncError::MalformedResponse(format!("invalid {field} '{raw}': {e}")))
}

/// Build the insert row for `record` on behalf of `user_id`.
pub fn to_remote(record: &ActivityRecord, user_id: &str) -> RemoteActivity {
    let payload = &record.payload;
    RemoteActivity {
        user_id: user_id.to_string(),
        activity_type: payload.activity_type.as_str().to_string(),
        liters_used: payload.liters_used,
        duration_minutes: Some(payload.duration_seconds / 60),
        water_source: payload.water_source.clone().map(String::from),
        flow_pressure: payload.flow_pressure.clone().map(String::from),
        is_eco_mode: Some(payload.is_eco_mode),
        notes: payload.notes.clone(),
        timestamp: format_timestamp(payload.timestamp),
        local_id: Some(record.local_id.to_string()),
    }
}

/// Check an insert response and return the server-assigned id.
///
/// # Errors
/// [`SyncError::MalformedResponse`] if the id is blank.
pub fn accepted_remote_id(row: &RemoteActivityRow) -> Result<&str, SyncError> {
    let id = row.id.trim();
    if id.is_empty() {
        return Err(SyncError::MalformedResponse(
            "insert response carried an empty id".into(),
        ));
    }
    Ok(id)
}

/// Reconstruct a local payload from a remote row.
///
/// Unknown source/pressure strings are kept as-is; an unknown activity type
/// or an unparseable timestamp fails the row.
///
/// # Errors
/// [`SyncError::MalformedResponse`] for rows that cannot be represented locally.
pub fn payload_from_row(row: &RemoteActivityRow) -> Result<ActivityPayload, SyncError> {
    let activity_type: ActivityType = row
        .activity_type
        .parse()
        .map_err(|e| SyncError::MalformedResponse(format!("row {}: {e}", row.id)))?;

    Ok(ActivityPayload {
        activity_type,
        liters_used: row.liters_used,
        duration_seconds: row.duration_minutes.unwrap_or(0).saturating_mul(60),
        water_source: row.water_source.as_deref().map(WaterSource::from_wire),
        flow_pressure: row.flow_pressure.as_deref().map(FlowPressure::from_wire),
        is_eco_mode: row.is_eco_mode.unwrap_or(false),
        notes: row.notes.clone(),
        timestamp: parse_timestamp("timestamp", &row.timestamp)?,
    })
}

/// Local id the row claims to originate from, if it carries a numeric one.
pub fn back_reference(row: &RemoteActivityRow) -> Option<i64> {
    row.local_id.as_deref()?.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

/// Server sync time of the row, if present and parseable.
pub fn synced_at(row: &RemoteActivityRow) -> Option<DateTime<Utc>> {
    parse_timestamp("synced_at", row.synced_at.as_deref()?).ok()
}
