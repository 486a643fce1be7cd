//! Week status state machine.
//!
//! Validates and executes status transitions for plan weeks, enforcing the
//! allowed transition graph through conditional single-row updates. There is
//! no locking anywhere: a caller that loses a race gets zero rows affected
//! and a diagnostic error, never a partial write.

use anyhow::{Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use cadence_db::models::WeekStatus;
use cadence_db::queries::weeks as db;

/// The week state machine.
///
/// Enforces the valid transition graph:
///
/// ```text
/// pending    -> generating  (worker claims the week)
/// generating -> generated   (payload persisted)
/// generating -> error       (generation failed, or stuck sweep)
/// error      -> pending     (retry)
/// ```
pub struct WeekStateMachine;

impl WeekStateMachine {
    /// Check whether a transition from `from` to `to` is a valid edge in
    /// the state graph.
    pub fn is_valid_transition(from: WeekStatus, to: WeekStatus) -> bool {
        matches!(
            (from, to),
            (WeekStatus::Pending, WeekStatus::Generating)
                | (WeekStatus::Generating, WeekStatus::Generated)
                | (WeekStatus::Generating, WeekStatus::Error)
                | (WeekStatus::Error, WeekStatus::Pending)
        )
    }

    /// Claim a week for generation: `pending -> generating`.
    pub async fn claim(pool: &PgPool, user_id: Uuid, week_number: i32) -> Result<()> {
        let rows = db::claim_week(pool, user_id, week_number).await?;
        Self::check_rows(pool, user_id, week_number, rows, WeekStatus::Pending).await
    }

    /// Record a successful generation: `generating -> generated`.
    pub async fn complete(
        pool: &PgPool,
        user_id: Uuid,
        week_number: i32,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let rows = db::mark_generated(pool, user_id, week_number, payload).await?;
        Self::check_rows(pool, user_id, week_number, rows, WeekStatus::Generating).await
    }

    /// Record a failed generation: `generating -> error`.
    pub async fn fail(
        pool: &PgPool,
        user_id: Uuid,
        week_number: i32,
        message: &str,
    ) -> Result<()> {
        let rows = db::mark_error(pool, user_id, week_number, message).await?;
        Self::check_rows(pool, user_id, week_number, rows, WeekStatus::Generating).await
    }

    /// Turn a zero-rows-affected result into a diagnostic error,
    /// distinguishing a missing row from an optimistic lock failure.
    async fn check_rows(
        pool: &PgPool,
        user_id: Uuid,
        week_number: i32,
        rows: u64,
        expected: WeekStatus,
    ) -> Result<()> {
        if rows > 0 {
            return Ok(());
        }
        let week = db::get_week(pool, user_id, week_number).await?;
        match week {
            None => bail!("week {week_number} not found for user {user_id}"),
            Some(w) => bail!(
                "optimistic lock failed: week {} for user {} has status {}, expected {}",
                week_number,
                user_id,
                w.status,
                expected
            ),
        }
    }
}
