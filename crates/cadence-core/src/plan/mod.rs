//! Onboarding service: create a plan and kick off background generation.
//!
//! Week 1 is generated synchronously -- onboarding without a first week is
//! useless to the user, so a week-1 failure fails the whole operation and
//! writes no plan rows. Everything after week 1 happens in a detached bulk
//! run.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use cadence_db::models::{PlanningContext, WeekStatus};
use cadence_db::queries::contexts::{self, NewPlanningContext};
use cadence_db::queries::generation_log::{self, NewLogEntry};
use cadence_db::queries::weeks;

use crate::phase::phase_for;
use crate::worker::GenerationWorker;

/// Request type written to the generation log for the synchronous week-1
/// attempt.
pub const REQUEST_ONBOARDING: &str = "onboarding";

/// Result of initializing a plan.
pub struct InitializedPlan {
    pub context: PlanningContext,
    /// Handle of the detached bulk run covering weeks 2..=total_weeks.
    /// Await it to follow generation to completion; drop it to detach.
    pub bulk_run: JoinHandle<()>,
}

/// Initialize a plan for a new user.
///
/// Generates week 1 through the worker's generator, then inserts the
/// context row and all week rows (week 1 `generated`, the rest `pending`)
/// in a single transaction, and finally spawns the bulk run for the
/// remaining weeks.
pub async fn initialize_plan(
    worker: &Arc<GenerationWorker>,
    new: NewPlanningContext,
) -> Result<InitializedPlan> {
    if new.total_weeks < 1 {
        bail!("total_weeks must be >= 1, got {}", new.total_weeks);
    }
    let pool = worker.pool().clone();

    if contexts::get_context(&pool, new.user_id).await?.is_some() {
        bail!("user {} already has a plan", new.user_id);
    }

    // The generation call needs a context before the row exists; build the
    // row image the transaction will persist.
    let ctx = PlanningContext {
        user_id: new.user_id,
        biometrics: new.biometrics.clone(),
        training_preferences: new.training_preferences.clone(),
        nutrition_preferences: new.nutrition_preferences.clone(),
        goal_targets: new.goal_targets.clone(),
        phase_distribution: serde_json::to_value(new.phase_distribution)
            .context("failed to serialize phase distribution")?,
        total_weeks: new.total_weeks,
        created_at: Utc::now(),
    };

    // Week 1, synchronous. Failure aborts onboarding before any row lands.
    let phase = phase_for(1, &new.phase_distribution);
    let first_week = match worker.generator().generate_week(&ctx, 1, phase).await {
        Ok(payload) => payload,
        Err(e) => {
            append_onboarding_log(&pool, new.user_id, Some(&e.to_string())).await;
            return Err(e).context("failed to generate week 1 during onboarding");
        }
    };

    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let context = contexts::insert_context(&mut *tx, &new).await?;
    weeks::insert_week(&mut *tx, new.user_id, 1, WeekStatus::Generated, Some(&first_week)).await?;
    for week_number in 2..=new.total_weeks {
        weeks::insert_week(&mut *tx, new.user_id, week_number, WeekStatus::Pending, None).await?;
    }

    tx.commit().await.context("failed to commit transaction")?;

    append_onboarding_log(&pool, new.user_id, None).await;
    tracing::info!(
        user_id = %new.user_id,
        total_weeks = new.total_weeks,
        "plan initialized, detaching bulk run"
    );

    let bulk_run = worker.spawn_bulk(new.user_id);

    Ok(InitializedPlan { context, bulk_run })
}

async fn append_onboarding_log(pool: &sqlx::PgPool, user_id: Uuid, error: Option<&str>) {
    let entry = NewLogEntry {
        user_id,
        request_type: REQUEST_ONBOARDING.to_owned(),
        week_number: Some(1),
        success: error.is_none(),
        error: error.map(str::to_owned),
    };
    if let Err(e) = generation_log::insert_log_entry(pool, &entry).await {
        tracing::error!(user_id = %user_id, error = %e, "failed to append onboarding log entry");
    }
}
