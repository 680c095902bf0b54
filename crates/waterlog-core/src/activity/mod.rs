//! Water-usage activity data model.

mod kinds;
mod record;

pub use kinds::{ActivityType, FlowPressure, WaterSource};
pub use record::{ActivityPayload, ActivityRecord, NewActivity, SyncStatus};
