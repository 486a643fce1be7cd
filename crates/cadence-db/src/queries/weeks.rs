//! Database query functions for the `plan_weeks` table.
//!
//! All status mutations here are conditional single-row updates: the WHERE
//! clause includes the expected current status, and callers get back
//! `rows_affected`. Zero rows means the row either does not exist or was
//! concurrently moved to another status -- the caller must not assume the
//! write happened.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{PlanWeek, WeekStatus};

/// Error message written by the stuck-week reconciliation sweep.
pub const STUCK_ERROR_MESSAGE: &str =
    "generation stalled: week left in generating past the reconciliation threshold";

/// Insert a new plan week row.
///
/// `payload` must be `Some` iff `status` is `generated` (the table CHECK
/// constraints reject anything else). Used by plan initialization inside a
/// transaction, hence the generic executor.
pub async fn insert_week<'e, E>(
    executor: E,
    user_id: Uuid,
    week_number: i32,
    status: WeekStatus,
    payload: Option<&serde_json::Value>,
) -> Result<PlanWeek>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let week = sqlx::query_as::<_, PlanWeek>(
        "INSERT INTO plan_weeks (user_id, week_number, status, plan_payload, generated_at) \
         VALUES ($1, $2, $3, $4, CASE WHEN $3 = 'generated' THEN now() END) \
         RETURNING *",
    )
    .bind(user_id)
    .bind(week_number)
    .bind(status)
    .bind(payload)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert week {week_number} for user {user_id}"))?;

    Ok(week)
}

/// Fetch a single week.
pub async fn get_week(pool: &PgPool, user_id: Uuid, week_number: i32) -> Result<Option<PlanWeek>> {
    let week = sqlx::query_as::<_, PlanWeek>(
        "SELECT * FROM plan_weeks WHERE user_id = $1 AND week_number = $2",
    )
    .bind(user_id)
    .bind(week_number)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch week {week_number} for user {user_id}"))?;

    Ok(week)
}

/// List all weeks for a user, ascending by week number.
pub async fn list_weeks(pool: &PgPool, user_id: Uuid) -> Result<Vec<PlanWeek>> {
    let weeks = sqlx::query_as::<_, PlanWeek>(
        "SELECT * FROM plan_weeks WHERE user_id = $1 ORDER BY week_number ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list weeks for user {user_id}"))?;

    Ok(weeks)
}

// -----------------------------------------------------------------------
// Conditional status transitions
// -----------------------------------------------------------------------

/// Atomically claim a week for generation: `pending -> generating`.
///
/// Returns the number of rows affected (0 means the week does not exist or
/// is not `pending`).
pub async fn claim_week(pool: &PgPool, user_id: Uuid, week_number: i32) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_weeks \
         SET status = 'generating', updated_at = now() \
         WHERE user_id = $1 AND week_number = $2 AND status = 'pending'",
    )
    .bind(user_id)
    .bind(week_number)
    .execute(pool)
    .await
    .with_context(|| format!("failed to claim week {week_number} for user {user_id}"))?;

    Ok(result.rows_affected())
}

/// Atomically record a successful generation: `generating -> generated`.
///
/// Sets the payload and `generated_at`, clears any stale error.
pub async fn mark_generated(
    pool: &PgPool,
    user_id: Uuid,
    week_number: i32,
    payload: &serde_json::Value,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_weeks \
         SET status = 'generated', \
             plan_payload = $3, \
             generation_error = NULL, \
             generated_at = now(), \
             updated_at = now() \
         WHERE user_id = $1 AND week_number = $2 AND status = 'generating'",
    )
    .bind(user_id)
    .bind(week_number)
    .bind(payload)
    .execute(pool)
    .await
    .with_context(|| format!("failed to mark week {week_number} generated for user {user_id}"))?;

    Ok(result.rows_affected())
}

/// Atomically record a failed generation: `generating -> error`.
pub async fn mark_error(
    pool: &PgPool,
    user_id: Uuid,
    week_number: i32,
    message: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_weeks \
         SET status = 'error', \
             generation_error = $3, \
             plan_payload = NULL, \
             generated_at = NULL, \
             updated_at = now() \
         WHERE user_id = $1 AND week_number = $2 AND status = 'generating'",
    )
    .bind(user_id)
    .bind(week_number)
    .bind(message)
    .execute(pool)
    .await
    .with_context(|| format!("failed to mark week {week_number} errored for user {user_id}"))?;

    Ok(result.rows_affected())
}

/// Atomically reset an errored week for retry: `error -> pending`.
///
/// Clears the error message. Zero rows affected means the week does not
/// exist or is not in `error` -- two concurrent retries cannot both win.
pub async fn retry_to_pending(pool: &PgPool, user_id: Uuid, week_number: i32) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE plan_weeks \
         SET status = 'pending', \
             generation_error = NULL, \
             updated_at = now() \
         WHERE user_id = $1 AND week_number = $2 AND status = 'error'",
    )
    .bind(user_id)
    .bind(week_number)
    .execute(pool)
    .await
    .with_context(|| format!("failed to reset week {week_number} to pending for user {user_id}"))?;

    Ok(result.rows_affected())
}

/// Reconciliation sweep: move weeks stuck in `generating` longer than
/// `threshold` to `error` so the normal retry path can pick them up.
///
/// A week can be left in `generating` when the process hosting the worker
/// dies mid-call, or when recording a generation failure itself failed.
/// Returns the weeks that were reset.
pub async fn reset_stuck_weeks(
    pool: &PgPool,
    user_id: Uuid,
    threshold_seconds: f64,
) -> Result<Vec<PlanWeek>> {
    let weeks = sqlx::query_as::<_, PlanWeek>(
        "UPDATE plan_weeks \
         SET status = 'error', \
             generation_error = $3, \
             plan_payload = NULL, \
             generated_at = NULL, \
             updated_at = now() \
         WHERE user_id = $1 \
           AND status = 'generating' \
           AND updated_at < now() - make_interval(secs => $2) \
         RETURNING *",
    )
    .bind(user_id)
    .bind(threshold_seconds)
    .bind(STUCK_ERROR_MESSAGE)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to reset stuck weeks for user {user_id}"))?;

    Ok(weeks)
}

// -----------------------------------------------------------------------
// Aggregation
// -----------------------------------------------------------------------

/// Status counts for a user's plan weeks.
#[derive(Debug, Clone, Default)]
pub struct WeekProgress {
    pub pending: i64,
    pub generating: i64,
    pub generated: i64,
    pub error: i64,
    pub total: i64,
}

/// Get a summary of week counts by status for a user.
pub async fn week_progress(pool: &PgPool, user_id: Uuid) -> Result<WeekProgress> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status::text, COUNT(*) as cnt \
         FROM plan_weeks \
         WHERE user_id = $1 \
         GROUP BY status",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to get week progress for user {user_id}"))?;

    let mut progress = WeekProgress::default();
    for (status, count) in &rows {
        match status.as_str() {
            "pending" => progress.pending = *count,
            "generating" => progress.generating = *count,
            "generated" => progress.generated = *count,
            "error" => progress.error = *count,
            _ => {}
        }
        progress.total += count;
    }
    Ok(progress)
}

/// Check whether every week of a user's plan has status `generated`.
///
/// Vacuously true for a user with zero rows; callers that need to
/// distinguish "no plan" check the total first.
pub async fn is_plan_complete(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM plan_weeks \
         WHERE user_id = $1 AND status != 'generated'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to check plan completion for user {user_id}"))?;

    Ok(row.0 == 0)
}
