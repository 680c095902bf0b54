use chrono::{DateTime, Utc};
use clap::Subcommand;
use waterlog_core::sync::ActivityStore;
use waterlog_core::{
    ActivityDb, ActivityPayload, ActivityType, FlowPressure, NewActivity, SyncStatus,
    WaterSource,
};

use super::CliResult;

#[derive(Subcommand)]
pub enum ActivityAction {
    /// Record a water activity (stored locally, synced later)
    Log {
        /// SHOWER, TAP, TOILET, LAUNDRY, DISHES, GARDEN or CUSTOM
        activity_type: ActivityType,
        /// Liters used
        liters: f64,
        /// Duration in seconds
        #[arg(long, default_value_t = 0)]
        duration_secs: u32,
        /// SHOWER or BUCKET_FAUCET
        #[arg(long)]
        source: Option<WaterSource>,
        /// LOW, NORMAL or HIGH
        #[arg(long)]
        pressure: Option<FlowPressure>,
        /// Eco mode was on
        #[arg(long)]
        eco: bool,
        #[arg(long)]
        notes: Option<String>,
        /// When it happened (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// List recent activities
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Only records waiting for upload
        #[arg(long)]
        pending: bool,
    },
    /// Number of records waiting for upload
    Pending,
}

pub async fn run(action: ActivityAction) -> CliResult {
    let db = ActivityDb::open()?;

    match action {
        ActivityAction::Log {
            activity_type,
            liters,
            duration_secs,
            source,
            pressure,
            eco,
            notes,
            at,
        } => {
            let mut payload = ActivityPayload::new(activity_type, liters)
                .with_duration_seconds(duration_secs)
                .with_eco_mode(eco);
            if let Some(source) = source {
                payload = payload.with_water_source(source);
            }
            if let Some(pressure) = pressure {
                payload = payload.with_flow_pressure(pressure);
            }
            if let Some(notes) = notes {
                payload = payload.with_notes(notes);
            }
            if let Some(at) = at {
                payload = payload.with_timestamp(at);
            }
            payload.validate()?;

            let local_id = db.insert(NewActivity::pending(payload)).await?;
            let record = db
                .get_by_local_id(local_id)
                .await?
                .ok_or("activity vanished after insert")?;
            tracing::info!(local_id, "activity logged");
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        ActivityAction::List { limit, pending } => {
            let records = if pending {
                db.list_by_sync_status(SyncStatus::Pending).await?
            } else {
                db.list_recent(limit).await?
            };
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        ActivityAction::Pending => {
            let count = db.count_by_sync_status(SyncStatus::Pending).await?;
            println!("{count}");
        }
    }
    Ok(())
}
