//! # Waterlog Core Library
//!
//! Core logic for Waterlog, an offline-first water usage log. Every
//! operation is available through the standalone `waterlog` CLI, which is a
//! thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Activities**: the logged record, its payload and its sync state
//! - **Storage**: SQLite activity store and TOML configuration
//! - **Sync**: engine that pushes pending records to a REST backend and pulls
//!   remote ones, plus the scheduler that drives it with retry/backoff
//!
//! ## Key Components
//!
//! - [`ActivityDb`]: local activity persistence
//! - [`SyncEngine`]: push/pull between local and remote stores
//! - [`SyncScheduler`]: on-demand and periodic sync triggers
//! - [`Config`]: application configuration management

pub mod activity;
pub mod error;
pub mod storage;
pub mod sync;

pub use activity::{
    ActivityPayload, ActivityRecord, ActivityType, FlowPressure, NewActivity, SyncStatus,
    WaterSource,
};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use storage::{ActivityDb, Config, RetryPolicy};
pub use sync::{SyncEngine, SyncOutcome, SyncOverview, SyncScheduler, SyncWorker, WorkResult};
