//! Retry coordinator.
//!
//! Validates that a single week is actually in `error`, resets it to
//! `pending`, and re-triggers generation for that week alone. Invalid
//! requests mutate nothing; every valid request re-attempts generation.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use cadence_db::models::WeekStatus;
use cadence_db::queries::weeks;

use crate::worker::GenerationWorker;

/// Why a retry request was rejected.
#[derive(Debug, Error)]
pub enum RetryError {
    /// No such week row (404-equivalent).
    #[error("week {week_number} not found")]
    WeekNotFound { week_number: i32 },

    /// The week exists but is not in `error` (400-equivalent). Carries the
    /// status that was observed.
    #[error("week {week_number} has status {status}, only errored weeks can be retried")]
    NotInError {
        week_number: i32,
        status: WeekStatus,
    },

    /// Database failure unrelated to the precondition.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Retry a single errored week.
///
/// The reset is a conditional `error -> pending` update: if a concurrent
/// caller got there first, this call observes zero rows affected and is
/// rejected without side effects. On success the worker's single-week
/// procedure is spawned fire-and-forget; this function returns as soon as
/// the retry is accepted, not when generation finishes.
pub async fn retry_week(
    worker: &Arc<GenerationWorker>,
    user_id: Uuid,
    week_number: i32,
) -> Result<(), RetryError> {
    let pool = worker.pool();

    let week = weeks::get_week(pool, user_id, week_number)
        .await?
        .ok_or(RetryError::WeekNotFound { week_number })?;

    if week.status != WeekStatus::Error {
        return Err(RetryError::NotInError {
            week_number,
            status: week.status,
        });
    }

    let rows = weeks::retry_to_pending(pool, user_id, week_number).await?;
    if rows == 0 {
        // Lost a race between the precondition read and the reset. Report
        // whatever the week looks like now.
        let status = weeks::get_week(pool, user_id, week_number)
            .await?
            .map(|w| w.status)
            .ok_or(RetryError::WeekNotFound { week_number })?;
        return Err(RetryError::NotInError {
            week_number,
            status,
        });
    }

    tracing::info!(user_id = %user_id, week = week_number, "retry accepted, re-dispatching week");
    worker.spawn_week(user_id, week_number);
    Ok(())
}
