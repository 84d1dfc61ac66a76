//! # Daily Sync Scheduler
//!
//! Single cancellable timer task that triggers the orchestrator once per day
//! at the configured local time. There is no polling loop; the task sleeps
//! until the next occurrence and reacts to the shutdown token. Manual
//! triggers go through the same orchestrator and therefore serialize against
//! the same run-in-progress guard.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Local, NaiveTime};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::orchestrator::{RunError, SyncOrchestrator};

/// Daily scheduler around the orchestrator.
pub struct DailyScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    schedule_time: NaiveTime,
}

impl DailyScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, schedule_time: NaiveTime) -> Self {
        Self {
            orchestrator,
            schedule_time,
        }
    }

    /// Run the scheduler loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(schedule_time = %self.schedule_time, "starting daily sync scheduler");

        loop {
            let wait = duration_until_next(Local::now(), self.schedule_time);
            info!(seconds = wait.as_secs(), "sleeping until next scheduled run");

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("sync scheduler shutdown requested");
                    break;
                }
                _ = sleep(wait) => {
                    match self.orchestrator.run_now().await {
                        Ok(report) => {
                            info!(
                                snapshot_date = ?report.snapshot_date,
                                new = report.new,
                                updated = report.updated,
                                unchanged = report.unchanged,
                                tenants = report.per_tenant.len(),
                                "scheduled sync run finished"
                            );
                        }
                        Err(RunError::AlreadyRunning) => {
                            warn!("scheduled run skipped, another run is in progress");
                        }
                        Err(err) => {
                            error!(error = %err, "scheduled sync run failed");
                        }
                    }
                }
            }
        }

        info!("sync scheduler stopped");
    }
}

/// Time to sleep from `now` until the next occurrence of `at`. An occurrence
/// earlier today rolls over to tomorrow.
fn duration_until_next(now: DateTime<Local>, at: NaiveTime) -> StdDuration {
    let today_at = now
        .date_naive()
        .and_time(at)
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(|| now.with_timezone(&Local));

    let next = if today_at > now {
        today_at
    } else {
        today_at + Duration::days(1)
    };

    (next - now).to_std().unwrap_or(StdDuration::from_secs(0))
}
