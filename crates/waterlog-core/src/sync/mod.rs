//! Offline-first cloud synchronization.
//!
//! Activities are written locally first and uploaded later. The engine
//! pushes `PENDING` records to a remote table and pulls rows created on
//! other devices; the scheduler decides when that happens and what to do
//! when it fails.

pub mod connectivity;
pub mod memory;
pub mod ports;
pub mod remote_codec;
pub mod rest_client;
pub mod scheduler;
pub mod session;
pub mod sync_engine;
pub mod types;

#[cfg(test)]
mod test_support;

pub use connectivity::{ConnectivityFlag, HostProbe};
pub use memory::MemoryActivityStore;
pub use ports::{
    ActivityStore, AlwaysPowered, AuthOracle, ConnectivityOracle, CursorStore, PowerOracle,
    RemoteActivityStore,
};
pub use remote_codec::{RemoteActivity, RemoteActivityRow};
pub use rest_client::RestActivityStore;
pub use scheduler::{push_decision, SyncScheduler, SyncWorker, WorkResult};
pub use session::{FixedSession, StoredSession};
pub use sync_engine::{PullReport, SyncEngine};
pub use types::{SyncError, SyncOutcome, SyncOverview};
