//! Activity records and their per-record sync state.
//!
//! A record is created locally as [`SyncStatus::Pending`] and becomes
//! [`SyncStatus::Synced`] once the remote store has accepted it. Nothing
//! ever leaves `Synced`, and a remote id, once set, is never replaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::kinds::{ActivityType, FlowPressure, WaterSource};
use crate::error::ValidationError;

/// Per-record synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Not yet confirmed stored remotely.
    Pending,
    /// Accepted by the remote store; carries a remote id.
    Synced,
    /// Reserved: a conflict was detected and needs resolution.
    Conflict,
    /// Reserved: deleted locally, waiting for remote delete.
    Deleted,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Conflict => "CONFLICT",
            SyncStatus::Deleted => "DELETED",
        }
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Only `PENDING` has outgoing edges. Staying in the same state is
    /// not a transition and is rejected too.
    pub fn can_transition_to(&self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (SyncStatus::Pending, SyncStatus::Synced)
                | (SyncStatus::Pending, SyncStatus::Conflict)
                | (SyncStatus::Pending, SyncStatus::Deleted)
        )
    }
}

impl FromStr for SyncStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(SyncStatus::Pending),
            "SYNCED" => Ok(SyncStatus::Synced),
            "CONFLICT" => Ok(SyncStatus::Conflict),
            "DELETED" => Ok(SyncStatus::Deleted),
            _ => Err(ValidationError::UnknownVariant {
                kind: "sync status",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business data of one water-usage event. Opaque to the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPayload {
    pub activity_type: ActivityType,
    pub liters_used: f64,
    /// Whole seconds.
    pub duration_seconds: u32,
    pub water_source: Option<WaterSource>,
    pub flow_pressure: Option<FlowPressure>,
    pub is_eco_mode: bool,
    pub notes: Option<String>,
    /// When the activity happened.
    pub timestamp: DateTime<Utc>,
}

impl ActivityPayload {
    /// Minimal payload: type and volume, logged now.
    pub fn new(activity_type: ActivityType, liters_used: f64) -> Self {
        Self {
            activity_type,
            liters_used,
            duration_seconds: 0,
            water_source: None,
            flow_pressure: None,
            is_eco_mode: false,
            notes: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_duration_seconds(mut self, seconds: u32) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_water_source(mut self, source: WaterSource) -> Self {
        self.water_source = Some(source);
        self
    }

    pub fn with_flow_pressure(mut self, pressure: FlowPressure) -> Self {
        self.flow_pressure = Some(pressure);
        self
    }

    pub fn with_eco_mode(mut self, eco: bool) -> Self {
        self.is_eco_mode = eco;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Reject payloads no store should accept.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.liters_used.is_finite() || self.liters_used < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "liters_used".into(),
                message: format!("must be a non-negative number, got {}", self.liters_used),
            });
        }
        Ok(())
    }
}

/// A stored activity, as held by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Assigned by the local store; never reused.
    pub local_id: i64,
    /// Assigned by the remote store; `None` until synced.
    pub remote_id: Option<String>,
    pub payload: ActivityPayload,
    pub sync_status: SyncStatus,
    /// Last local mutation.
    pub last_modified: DateTime<Utc>,
}

impl ActivityRecord {
    /// Copy of this record transitioned to `SYNCED` with the given remote id.
    ///
    /// # Errors
    /// Returns [`ValidationError::IllegalTransition`] unless the record is
    /// currently `PENDING`.
    pub fn mark_synced(
        &self,
        remote_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if !self.sync_status.can_transition_to(SyncStatus::Synced) {
            return Err(ValidationError::IllegalTransition {
                local_id: self.local_id,
                from: self.sync_status,
                to: SyncStatus::Synced,
            });
        }
        let remote_id = remote_id.into();
        if remote_id.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "remote_id".into(),
                message: "remote id must not be empty".into(),
            });
        }
        Ok(Self {
            remote_id: Some(remote_id),
            sync_status: SyncStatus::Synced,
            last_modified: at,
            ..self.clone()
        })
    }

    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }
}

/// A record about to be inserted; the store assigns `local_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub remote_id: Option<String>,
    pub payload: ActivityPayload,
    pub sync_status: SyncStatus,
    pub last_modified: DateTime<Utc>,
}

impl NewActivity {
    /// A freshly logged activity: `PENDING`, no remote id.
    pub fn pending(payload: ActivityPayload) -> Self {
        Self {
            remote_id: None,
            payload,
            sync_status: SyncStatus::Pending,
            last_modified: Utc::now(),
        }
    }

    /// An activity that originated remotely: `SYNCED` from birth.
    pub fn from_remote(payload: ActivityPayload, remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
            payload,
            sync_status: SyncStatus::Synced,
            last_modified: Utc::now(),
        }
    }

    /// Attach the store-assigned id.
    pub fn into_record(self, local_id: i64) -> ActivityRecord {
        ActivityRecord {
            local_id,
            remote_id: self.remote_id,
            payload: self.payload,
            sync_status: self.sync_status,
            last_modified: self.last_modified,
        }
    }
}
