//! Database query functions for the `generation_log` table.
//!
//! The log is append-only: one row per generation attempt, success or
//! failure. Rows are never updated or deleted.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::GenerationLogEntry;

/// Parameters for inserting a new generation log row.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub user_id: Uuid,
    pub request_type: String,
    pub week_number: Option<i32>,
    pub success: bool,
    pub error: Option<String>,
}

/// Insert a new log row. Returns the inserted row with server-generated
/// defaults (id, recorded_at).
pub async fn insert_log_entry(pool: &PgPool, new: &NewLogEntry) -> Result<GenerationLogEntry> {
    let entry = sqlx::query_as::<_, GenerationLogEntry>(
        "INSERT INTO generation_log (user_id, request_type, week_number, success, error) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(&new.request_type)
    .bind(new.week_number)
    .bind(new.success)
    .bind(&new.error)
    .fetch_one(pool)
    .await
    .with_context(|| {
        format!(
            "failed to insert generation log entry for user {} type {}",
            new.user_id, new.request_type
        )
    })?;

    Ok(entry)
}

/// Get the most recent log entries for a user, newest first.
pub async fn recent_entries_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<GenerationLogEntry>> {
    let entries = sqlx::query_as::<_, GenerationLogEntry>(
        "SELECT * FROM generation_log \
         WHERE user_id = $1 \
         ORDER BY recorded_at DESC \
         LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list generation log entries for user {user_id}"))?;

    Ok(entries)
}

/// Count attempts for a given user and week across the whole log.
pub async fn count_attempts_for_week(pool: &PgPool, user_id: Uuid, week_number: i32) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM generation_log \
         WHERE user_id = $1 AND week_number = $2",
    )
    .bind(user_id)
    .bind(week_number)
    .fetch_one(pool)
    .await
    .with_context(|| {
        format!("failed to count generation attempts for user {user_id} week {week_number}")
    })?;

    Ok(row.0)
}
