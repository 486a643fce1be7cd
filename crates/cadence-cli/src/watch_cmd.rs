//! `cadence watch` command: poll plan status until generation settles.
//!
//! Runs the same polling loop a client would: fixed interval, auto-retry of
//! each errored week at most once per watch session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use uuid::Uuid;

use cadence_core::poller::{InProcessApi, PlanApi, PollOutcome, StatusPoller};
use cadence_core::retry::RetryError;
use cadence_core::status::{PlanStatus, StatusError};
use cadence_core::worker::GenerationWorker;
use cadence_db::models::WeekStatus;

/// [`PlanApi`] decorator that prints a progress line for every status fetch.
struct PrintingApi {
    inner: InProcessApi,
}

#[async_trait]
impl PlanApi for PrintingApi {
    async fn status(&self) -> Result<PlanStatus, StatusError> {
        let report = self.inner.status().await?;
        let errored = report
            .weeks
            .iter()
            .filter(|w| w.status == WeekStatus::Error)
            .map(|w| w.week_number.to_string())
            .collect::<Vec<_>>();
        let errors = if errored.is_empty() {
            String::new()
        } else {
            format!("  errors: week {}", errored.join(", week "))
        };
        println!(
            "[{}] {}/{} generated, {} pending{errors}",
            chrono::Utc::now().format("%H:%M:%S"),
            report.generated_count,
            report.total_weeks,
            report.pending_count,
        );
        Ok(report)
    }

    async fn retry_week(&self, week_number: i32) -> Result<(), RetryError> {
        println!("  retrying week {week_number}...");
        self.inner.retry_week(week_number).await
    }
}

/// Run the watch command.
pub async fn run_watch(
    worker: &Arc<GenerationWorker>,
    user_id_str: &str,
    interval_secs: u64,
) -> Result<()> {
    let user_id =
        Uuid::parse_str(user_id_str).with_context(|| format!("invalid user ID: {user_id_str}"))?;

    let api = PrintingApi {
        inner: InProcessApi::new(Arc::clone(worker), user_id),
    };
    let mut poller = StatusPoller::with_interval(api, Duration::from_secs(interval_secs));

    println!("Watching plan for user {user_id} (Ctrl+C to stop)...");
    match poller.run().await {
        PollOutcome::Complete => {
            println!("Plan complete.");
            Ok(())
        }
        PollOutcome::NoPlan => {
            println!("No plan found for user {user_id}.");
            Ok(())
        }
        PollOutcome::Failed => bail!("status polling failed"),
        PollOutcome::Continue => unreachable!("run() only returns stop outcomes"),
    }
}
