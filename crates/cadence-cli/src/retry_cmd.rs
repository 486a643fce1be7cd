//! `cadence retry` command: retry one errored week and wait for the result.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use uuid::Uuid;

use cadence_core::retry::{self, RetryError};
use cadence_core::worker::GenerationWorker;
use cadence_db::models::WeekStatus;
use cadence_db::queries::weeks;

/// Run the retry command.
///
/// The coordinator dispatches the re-attempt fire-and-forget; since this
/// process is the one hosting the attempt, wait for the week to settle
/// before exiting.
pub async fn run_retry(
    worker: &Arc<GenerationWorker>,
    user_id_str: &str,
    week_number: i32,
) -> Result<()> {
    let user_id =
        Uuid::parse_str(user_id_str).with_context(|| format!("invalid user ID: {user_id_str}"))?;

    match retry::retry_week(worker, user_id, week_number).await {
        Ok(()) => {}
        Err(RetryError::WeekNotFound { .. }) => {
            bail!("week {week_number} not found for user {user_id}");
        }
        Err(RetryError::NotInError { status, .. }) => {
            bail!("week {week_number} has status {status}; only errored weeks can be retried");
        }
        Err(RetryError::Internal(e)) => return Err(e),
    }

    println!("Retrying week {week_number} for user {user_id}...");

    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let week = weeks::get_week(worker.pool(), user_id, week_number)
            .await?
            .with_context(|| format!("week {week_number} disappeared during retry"))?;
        match week.status {
            WeekStatus::Pending | WeekStatus::Generating => continue,
            WeekStatus::Generated => {
                println!("Week {week_number} generated.");
                return Ok(());
            }
            WeekStatus::Error => {
                let message = week.generation_error.unwrap_or_default();
                bail!("week {week_number} failed again: {message}");
            }
        }
    }
}
