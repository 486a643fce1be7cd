//! Status poller: the client-side loop the pipeline must support.
//!
//! Periodically reads the aggregated status, auto-retries each errored week
//! at most once per poller lifetime, and stops once the plan is complete,
//! absent, or the status source fails. The "already retried" set is
//! in-memory by design: a new poller instance (the page-reload analogue)
//! starts with a clean slate and may auto-retry a week a second time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use cadence_db::models::WeekStatus;

use crate::retry::{self, RetryError};
use crate::status::{self, PlanStatus, StatusError};
use crate::worker::GenerationWorker;

/// The surface the poller talks to. In production this is the HTTP status
/// endpoint; in-process (CLI `watch`) and in tests it is implemented
/// directly.
#[async_trait]
pub trait PlanApi: Send + Sync {
    async fn status(&self) -> Result<PlanStatus, StatusError>;
    async fn retry_week(&self, week_number: i32) -> Result<(), RetryError>;
}

/// [`PlanApi`] implementation that calls the aggregator and retry
/// coordinator directly, bypassing HTTP.
pub struct InProcessApi {
    worker: Arc<GenerationWorker>,
    user_id: Uuid,
}

impl InProcessApi {
    pub fn new(worker: Arc<GenerationWorker>, user_id: Uuid) -> Self {
        Self { worker, user_id }
    }
}

#[async_trait]
impl PlanApi for InProcessApi {
    async fn status(&self) -> Result<PlanStatus, StatusError> {
        status::plan_status(self.worker.pool(), self.user_id).await
    }

    async fn retry_week(&self, week_number: i32) -> Result<(), RetryError> {
        retry::retry_week(&self.worker, self.user_id, week_number).await
    }
}

/// Why the poller stopped, or why it wants another tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Plan still in progress; poll again after the interval.
    Continue,
    /// Every week is generated (or the plan has zero weeks).
    Complete,
    /// No plan exists for this user.
    NoPlan,
    /// The status source failed; polling stops immediately.
    Failed,
}

/// Fixed-interval status poller with once-per-week auto-retry.
pub struct StatusPoller<A: PlanApi> {
    api: A,
    interval: Duration,
    retried: HashSet<i32>,
}

impl<A: PlanApi> StatusPoller<A> {
    /// Default polling interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    pub fn new(api: A) -> Self {
        Self::with_interval(api, Self::DEFAULT_INTERVAL)
    }

    pub fn with_interval(api: A, interval: Duration) -> Self {
        Self {
            api,
            interval,
            retried: HashSet::new(),
        }
    }

    /// One poll tick: read status, fire pending auto-retries, decide
    /// whether to keep going.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let report = match self.api.status().await {
            Ok(report) => report,
            Err(StatusError::NoPlan(user_id)) => {
                tracing::info!(user_id = %user_id, "no plan, stopping poller");
                return PollOutcome::NoPlan;
            }
            Err(e) => {
                tracing::warn!(error = %e, "status request failed, stopping poller");
                return PollOutcome::Failed;
            }
        };

        if report.total_weeks == 0 || report.is_complete {
            return PollOutcome::Complete;
        }

        for week in &report.weeks {
            let errored = week.status == WeekStatus::Error;
            if errored && !self.retried.contains(&week.week_number) {
                // Mark first: one auto-retry per week per poller lifetime,
                // even when the request itself is rejected.
                self.retried.insert(week.week_number);
                match self.api.retry_week(week.week_number).await {
                    Ok(()) => {
                        tracing::info!(week = week.week_number, "auto-retry dispatched");
                    }
                    Err(e) => {
                        tracing::warn!(week = week.week_number, error = %e, "auto-retry rejected");
                    }
                }
            }
        }

        PollOutcome::Continue
    }

    /// Poll on the fixed interval until a stop condition is reached.
    pub async fn run(&mut self) -> PollOutcome {
        loop {
            let outcome = self.poll_once().await;
            if outcome != PollOutcome::Continue {
                return outcome;
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
