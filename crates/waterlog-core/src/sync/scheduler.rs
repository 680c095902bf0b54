//! Background sync scheduling.
//!
//! [`SyncWorker`] runs one cycle (push, then pull) and turns the outcomes
//! into a [`WorkResult`]. [`SyncScheduler`] decides when cycles run:
//!
//! - on demand, where a new request replaces one that has not started yet
//! - periodically, gated on connectivity and battery, registered at most once
//!
//! `Retry` results are re-run with exponential backoff. Cycles never
//! overlap; the worker serializes them.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::storage::{RetryPolicy, SyncConfig};
use crate::sync::ports::{ConnectivityOracle, PowerOracle};
use crate::sync::sync_engine::SyncEngine;
use crate::sync::types::{SyncOutcome, SyncOverview};

/// What the host should do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    /// Done until the next trigger.
    Success,
    /// Run again after backoff.
    Retry,
}

/// Scheduler action for a push outcome.
///
/// Being signed out or unconfigured is a steady state, so those end the
/// cycle without a retry.
pub fn push_decision(outcome: &SyncOutcome) -> WorkResult {
    match outcome {
        SyncOutcome::Success { .. }
        | SyncOutcome::NotAuthenticated
        | SyncOutcome::NotConfigured => WorkResult::Success,
        SyncOutcome::NoNetwork | SyncOutcome::Error { .. } => WorkResult::Retry,
    }
}

#[derive(Debug, Default)]
struct CycleState {
    last_sync_at: Option<chrono::DateTime<Utc>>,
    in_progress: bool,
    last_push: Option<SyncOutcome>,
    last_pull: Option<SyncOutcome>,
}

/// Clears the in-progress flag even if the cycle is cancelled.
struct InProgress<'a>(&'a Mutex<CycleState>);

impl<'a> InProgress<'a> {
    fn enter(state: &'a Mutex<CycleState>) -> Self {
        if let Ok(mut s) = state.lock() {
            s.in_progress = true;
        }
        Self(state)
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        if let Ok(mut s) = self.0.lock() {
            s.in_progress = false;
        }
    }
}

/// Runs sync cycles against one engine.
pub struct SyncWorker {
    engine: Arc<SyncEngine>,
    cycle_lock: tokio::sync::Mutex<()>,
    state: Mutex<CycleState>,
}

impl SyncWorker {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            cycle_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(CycleState::default()),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Push pending records, then pull if the push went through.
    ///
    /// Only the push decides the result. A failed pull is logged and the
    /// cycle still succeeds, so it never holds back later pushes.
    pub async fn run_cycle(&self) -> WorkResult {
        self.run_cycle_marking(None).await
    }

    /// `started` flips once this cycle holds the cycle lock. Until then the
    /// caller may still be replaced.
    async fn run_cycle_marking(&self, started: Option<&AtomicBool>) -> WorkResult {
        let _serial = self.cycle_lock.lock().await;
        if let Some(started) = started {
            started.store(true, Ordering::SeqCst);
        }
        let _in_progress = InProgress::enter(&self.state);

        let push = self.engine.push_pending().await;
        let decision = push_decision(&push);
        match &push {
            SyncOutcome::Success { count } => tracing::info!(count, "push succeeded"),
            SyncOutcome::NoNetwork => tracing::debug!("push deferred: no network"),
            SyncOutcome::Error { message } => tracing::warn!(%message, "push failed"),
            other => tracing::debug!(outcome = %other, "push skipped"),
        }

        let pull = if push.is_success() {
            let pull = self.engine.pull_incremental().await;
            match &pull {
                SyncOutcome::Success { count } => tracing::info!(count, "pull succeeded"),
                other => tracing::warn!(outcome = %other, "pull did not complete"),
            }
            Some(pull)
        } else {
            None
        };

        if let Ok(mut s) = self.state.lock() {
            if push.is_success() {
                s.last_sync_at = Some(Utc::now());
            }
            s.last_push = Some(push);
            if pull.is_some() {
                s.last_pull = pull;
            }
        }
        decision
    }

    /// Current status for display.
    pub async fn overview(&self) -> SyncOverview {
        let pending_count = self.engine.pending_count().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to count pending records");
            0
        });
        let pull_cursor = self.engine.pull_cursor().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read pull cursor");
            None
        });
        let (last_sync_at, in_progress, last_push, last_pull) = match self.state.lock() {
            Ok(s) => (
                s.last_sync_at,
                s.in_progress,
                s.last_push.clone(),
                s.last_pull.clone(),
            ),
            Err(_) => (None, false, None, None),
        };
        SyncOverview {
            last_sync_at,
            pending_count,
            in_progress,
            last_push,
            last_pull,
            pull_cursor,
        }
    }
}

/// Run cycles until one succeeds or the policy runs out of attempts.
async fn run_with_retries(
    worker: Arc<SyncWorker>,
    policy: RetryPolicy,
    started: Arc<AtomicBool>,
) -> WorkResult {
    let mut attempt = 0;
    loop {
        let delay = policy.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tracing::debug!(attempt, delay_secs = delay.as_secs(), "retrying sync after backoff");
            started.store(false, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
        }
        let result = worker.run_cycle_marking(Some(&started)).await;
        attempt += 1;
        if result == WorkResult::Success || attempt >= policy.max_attempts {
            if result == WorkResult::Retry {
                tracing::warn!(attempts = attempt, "giving up until the next trigger");
            }
            return result;
        }
    }
}

struct OneTimeSlot {
    handle: JoinHandle<WorkResult>,
    started: Arc<AtomicBool>,
}

/// Triggers sync cycles on demand and on a fixed interval.
///
/// Must be used from within a tokio runtime.
pub struct SyncScheduler {
    worker: Arc<SyncWorker>,
    connectivity: Arc<dyn ConnectivityOracle>,
    power: Arc<dyn PowerOracle>,
    config: SyncConfig,
    one_time: Mutex<Option<OneTimeSlot>>,
    /// Earlier requests that were already running when replaced.
    superseded: Mutex<Vec<JoinHandle<WorkResult>>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(
        worker: Arc<SyncWorker>,
        connectivity: Arc<dyn ConnectivityOracle>,
        power: Arc<dyn PowerOracle>,
        config: SyncConfig,
    ) -> Self {
        Self {
            worker,
            connectivity,
            power,
            config,
            one_time: Mutex::new(None),
            superseded: Mutex::new(Vec::new()),
            periodic: Mutex::new(None),
        }
    }

    pub fn worker(&self) -> &Arc<SyncWorker> {
        &self.worker
    }

    /// Queue an on-demand sync.
    ///
    /// A previous request that is still queued or waiting out a backoff is
    /// replaced. One that is already running is left to finish.
    pub fn request_sync(&self) {
        let Ok(mut slot) = self.one_time.lock() else {
            tracing::error!("on-demand slot poisoned");
            return;
        };
        if let Some(previous) = slot.take() {
            if previous.started.load(Ordering::SeqCst) {
                tracing::debug!("previous sync still running");
                if let Ok(mut superseded) = self.superseded.lock() {
                    superseded.retain(|h| !h.is_finished());
                    superseded.push(previous.handle);
                }
            } else {
                previous.handle.abort();
                tracing::debug!("replaced queued sync request");
            }
        }
        let started = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_with_retries(
            self.worker.clone(),
            self.config.retry_policy(),
            started.clone(),
        ));
        *slot = Some(OneTimeSlot { handle, started });
    }

    /// Wait for the latest on-demand request. `None` if there is none or it
    /// was replaced.
    pub async fn wait_for_request(&self) -> Option<WorkResult> {
        let slot = self.one_time.lock().ok()?.take()?;
        slot.handle.await.ok()
    }

    /// Register the periodic sync unless one is already registered.
    ///
    /// Returns `true` if this call created the schedule.
    pub fn ensure_periodic(&self) -> bool {
        let Ok(mut periodic) = self.periodic.lock() else {
            tracing::error!("periodic slot poisoned");
            return false;
        };
        if periodic.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("periodic sync already scheduled");
            return false;
        }

        let worker = self.worker.clone();
        let connectivity = self.connectivity.clone();
        let power = self.power.clone();
        let period = self.config.periodic_interval();
        let policy = self.config.retry_policy();
        let require_battery = self.config.require_battery_not_low;

        *periodic = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !connectivity.is_available() {
                    tracing::debug!("periodic sync skipped: offline");
                    continue;
                }
                if require_battery && power.is_battery_low() {
                    tracing::debug!("periodic sync skipped: battery low");
                    continue;
                }
                run_with_retries(
                    worker.clone(),
                    policy.clone(),
                    Arc::new(AtomicBool::new(false)),
                )
                .await;
            }
        }));
        tracing::info!(interval_secs = period.as_secs(), "periodic sync scheduled");
        true
    }

    /// Stop the periodic schedule and every on-demand request, including
    /// ones waiting on or running a cycle.
    pub fn cancel_all(&self) {
        if let Ok(mut slot) = self.one_time.lock() {
            if let Some(slot) = slot.take() {
                slot.handle.abort();
            }
        }
        if let Ok(mut superseded) = self.superseded.lock() {
            for handle in superseded.drain(..) {
                handle.abort();
            }
        }
        if let Ok(mut periodic) = self.periodic.lock() {
            if let Some(handle) = periodic.take() {
                handle.abort();
            }
        }
        tracing::debug!("sync schedules cancelled");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
