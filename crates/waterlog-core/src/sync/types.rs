//! Core types for cloud synchronization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one engine operation (`push_pending` / `pull_since`).
///
/// This is the engine's whole error surface: every failure becomes one of
/// these variants, nothing is raised past the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Number of records successfully affected. Zero means nothing to do.
    Success { count: usize },
    /// Diagnostic only; never parsed by callers.
    Error { message: String },
    /// No outbound connectivity.
    NoNetwork,
    /// Remote backend has no usable URL/credentials.
    NotConfigured,
    /// Nobody is signed in.
    NotAuthenticated,
}

impl SyncOutcome {
    pub fn success(count: usize) -> Self {
        SyncOutcome::Success { count }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SyncOutcome::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success { .. })
    }

    /// Count for `Success`, `None` otherwise.
    pub fn count(&self) -> Option<usize> {
        match self {
            SyncOutcome::Success { count } => Some(*count),
            _ => None,
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Success { count } => write!(f, "success ({count})"),
            SyncOutcome::Error { message } => write!(f, "error: {message}"),
            SyncOutcome::NoNetwork => f.write_str("no network"),
            SyncOutcome::NotConfigured => f.write_str("remote not configured"),
            SyncOutcome::NotAuthenticated => f.write_str("not authenticated"),
        }
    }
}

/// Snapshot of sync activity for display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOverview {
    /// Last cycle whose push step succeeded.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Records still waiting for upload.
    pub pending_count: usize,
    /// Whether a cycle is currently running.
    pub in_progress: bool,
    pub last_push: Option<SyncOutcome>,
    pub last_pull: Option<SyncOutcome>,
    /// High-water mark of the last successful pull.
    pub pull_cursor: Option<DateTime<Utc>>,
}

/// Remote-side failures. Converted to [`SyncOutcome`] by the engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Remote rejected request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed remote response: {0}")]
    MalformedResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote store not configured")]
    NotConfigured,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl SyncError {
    /// Whether repeating the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
