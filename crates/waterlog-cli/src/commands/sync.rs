use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use waterlog_core::sync::{
    AlwaysPowered, HostProbe, RestActivityStore, StoredSession, SyncScheduler, SyncWorker,
};
use waterlog_core::{ActivityDb, Config, SyncEngine, SyncOutcome, WorkResult};

use super::CliResult;

const CONNECTIVITY_REFRESH: Duration = Duration::from_secs(60);

#[derive(Subcommand)]
pub enum SyncAction {
    /// Upload pending activities
    Push,
    /// Download activities recorded on other devices
    Pull {
        /// Pull everything synced after this time (RFC 3339) instead of
        /// resuming from the stored cursor
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Run one full cycle (push, then pull)
    Run,
    /// Show pending count and pull cursor
    Status,
    /// Keep syncing on the configured interval until interrupted
    Daemon,
}

/// Store, engine and worker composed from the user's config.
struct SyncStack {
    config: Config,
    connectivity: Arc<HostProbe>,
    worker: Arc<SyncWorker>,
}

impl SyncStack {
    fn build() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let db = Arc::new(ActivityDb::open()?);
        let session = Arc::new(StoredSession::load());
        let remote = Arc::new(RestActivityStore::new(config.remote.clone(), session.clone())?);
        let connectivity = Arc::new(HostProbe::from_config(&config.remote));

        let engine = SyncEngine::new(db.clone(), remote, connectivity.clone(), session)
            .with_cursor_store(db);
        let worker = Arc::new(SyncWorker::new(Arc::new(engine)));
        Ok(Self {
            config,
            connectivity,
            worker,
        })
    }

    fn engine(&self) -> &SyncEngine {
        self.worker.engine()
    }
}

#[derive(Serialize)]
struct CycleReport {
    retry: bool,
    #[serde(flatten)]
    overview: waterlog_core::SyncOverview,
}

fn print_outcome(outcome: &SyncOutcome) -> CliResult {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

pub async fn run(action: SyncAction) -> CliResult {
    let stack = SyncStack::build()?;
    if !matches!(action, SyncAction::Status) {
        stack.connectivity.refresh().await;
    }

    match action {
        SyncAction::Push => print_outcome(&stack.engine().push_pending().await)?,
        SyncAction::Pull { since: Some(since) } => {
            print_outcome(&stack.engine().pull_since(since).await)?
        }
        SyncAction::Pull { since: None } => {
            print_outcome(&stack.engine().pull_incremental().await)?
        }
        SyncAction::Run => {
            let result = stack.worker.run_cycle().await;
            let report = CycleReport {
                retry: result == WorkResult::Retry,
                overview: stack.worker.overview().await,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        SyncAction::Status => {
            let overview = stack.worker.overview().await;
            println!("{}", serde_json::to_string_pretty(&overview)?);
        }
        SyncAction::Daemon => {
            let scheduler = SyncScheduler::new(
                stack.worker.clone(),
                stack.connectivity.clone(),
                Arc::new(AlwaysPowered),
                stack.config.sync.clone(),
            );
            let refresher = stack.connectivity.spawn_refresher(CONNECTIVITY_REFRESH);
            scheduler.ensure_periodic();
            tracing::info!("sync daemon running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            scheduler.cancel_all();
            refresher.abort();
            tracing::info!("sync daemon stopped");
        }
    }
    Ok(())
}
