//! Database query functions for the `planning_contexts` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{PhaseDistribution, PlanningContext};

/// Parameters for inserting a new planning context row.
#[derive(Debug, Clone)]
pub struct NewPlanningContext {
    pub user_id: Uuid,
    pub biometrics: serde_json::Value,
    pub training_preferences: serde_json::Value,
    pub nutrition_preferences: serde_json::Value,
    pub goal_targets: serde_json::Value,
    pub phase_distribution: PhaseDistribution,
    pub total_weeks: i32,
}

/// Insert a new planning context row. Returns the inserted row with
/// server-generated defaults (created_at).
///
/// Contexts are immutable: there is deliberately no update query for this
/// table.
pub async fn insert_context<'e, E>(executor: E, new: &NewPlanningContext) -> Result<PlanningContext>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let distribution = serde_json::to_value(new.phase_distribution)
        .context("failed to serialize phase distribution")?;

    let ctx = sqlx::query_as::<_, PlanningContext>(
        "INSERT INTO planning_contexts \
             (user_id, biometrics, training_preferences, nutrition_preferences, \
              goal_targets, phase_distribution, total_weeks) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(&new.biometrics)
    .bind(&new.training_preferences)
    .bind(&new.nutrition_preferences)
    .bind(&new.goal_targets)
    .bind(distribution)
    .bind(new.total_weeks)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert planning context for user {}", new.user_id))?;

    Ok(ctx)
}

/// Fetch the planning context for a user.
pub async fn get_context(pool: &PgPool, user_id: Uuid) -> Result<Option<PlanningContext>> {
    let ctx = sqlx::query_as::<_, PlanningContext>(
        "SELECT * FROM planning_contexts WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch planning context for user {user_id}"))?;

    Ok(ctx)
}
