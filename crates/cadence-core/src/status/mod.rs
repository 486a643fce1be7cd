//! Plan status aggregator.
//!
//! Computes overall completion from the week rows for client polling. The
//! serialized field names are the polling contract -- clients key off
//! `isComplete`, `generatedCount`, and the per-week `status` strings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use cadence_db::models::WeekStatus;
use cadence_db::queries::weeks;

/// Aggregated plan status for one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatus {
    pub total_weeks: i64,
    pub generated_count: i64,
    pub pending_count: i64,
    pub is_complete: bool,
    pub weeks: Vec<WeekSummary>,
}

/// One week's slice of the status report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSummary {
    pub week_number: i32,
    pub status: WeekStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a status request failed.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The user has no plan at all -- distinct from a plan with zero
    /// progress (404-equivalent).
    #[error("no plan exists for user {0}")]
    NoPlan(Uuid),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Compute the aggregated status for a user's plan.
pub async fn plan_status(pool: &PgPool, user_id: Uuid) -> Result<PlanStatus, StatusError> {
    let rows = weeks::list_weeks(pool, user_id).await?;
    if rows.is_empty() {
        return Err(StatusError::NoPlan(user_id));
    }

    let progress = weeks::week_progress(pool, user_id).await?;

    let weeks = rows
        .into_iter()
        .map(|w| WeekSummary {
            week_number: w.week_number,
            status: w.status,
            generated_at: w.generated_at,
            error: w.generation_error,
        })
        .collect();

    Ok(PlanStatus {
        total_weeks: progress.total,
        generated_count: progress.generated,
        pending_count: progress.pending,
        is_complete: progress.generated == progress.total,
        weeks,
    })
}
