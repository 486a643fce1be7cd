//! Sequential background generation worker.
//!
//! Drives generation for the remaining weeks of a user's plan after week 1
//! is produced at onboarding. One worker pass per user, weeks strictly
//! ascending, a fixed delay between calls -- sequential execution is the
//! deliberate backpressure against the rate-limited provider, not an
//! accident. A failed week is recorded and skipped over; it never stops
//! the pass.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use cadence_db::models::PlanningContext;
use cadence_db::queries::contexts;
use cadence_db::queries::generation_log::{self, NewLogEntry};
use cadence_db::queries::weeks;

use crate::generator::WeekGenerator;
use crate::phase::phase_for;
use crate::state::WeekStateMachine;

/// Request type written to the generation log for bulk-run attempts.
pub const REQUEST_WEEKLY: &str = "weekly_plan";
/// Request type written to the generation log for retry attempts.
pub const REQUEST_RETRY: &str = "retry";

/// Worker tuning knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause between consecutive week attempts in a bulk run.
    pub inter_week_delay: Duration,
    /// Age past which a `generating` week is considered stuck and swept
    /// back to `error`.
    pub stuck_threshold: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inter_week_delay: Duration::from_secs(5),
            stuck_threshold: Duration::from_secs(15 * 60),
        }
    }
}

/// Outcome of one single-week attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeekOutcome {
    /// Payload persisted, week is `generated`.
    Generated,
    /// Generation failed; week is `error` with this message.
    Failed { message: String },
}

/// Summary of a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub attempted: u32,
    pub generated: u32,
    pub failed: u32,
    /// Weeks that could not be attempted at all (already claimed, missing
    /// row). These are logged and skipped.
    pub skipped: u32,
}

/// The generation worker. Cheap to clone behind an [`Arc`]; the CLI and the
/// HTTP server share one instance.
pub struct GenerationWorker {
    pool: PgPool,
    generator: Arc<dyn WeekGenerator>,
    config: WorkerConfig,
}

impl GenerationWorker {
    pub fn new(pool: PgPool, generator: Arc<dyn WeekGenerator>, config: WorkerConfig) -> Self {
        Self {
            pool,
            generator,
            config,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn generator(&self) -> &Arc<dyn WeekGenerator> {
        &self.generator
    }

    /// Run the single-week procedure: resolve phase, claim the week, invoke
    /// the generator, persist the result, append an audit log row.
    ///
    /// A generator failure is captured as [`WeekOutcome::Failed`], never
    /// propagated. An `Err` from this function means the attempt could not
    /// run at all (missing context, lost claim race, persistence failure on
    /// the success path).
    pub async fn generate_week(
        &self,
        user_id: Uuid,
        week_number: i32,
        request_type: &str,
    ) -> Result<WeekOutcome> {
        let ctx = self.load_context(user_id).await?;
        let phase = phase_for(week_number.max(1) as u32, &ctx.distribution()?);

        WeekStateMachine::claim(&self.pool, user_id, week_number).await?;

        tracing::info!(
            user_id = %user_id,
            week = week_number,
            phase = %phase,
            provider = self.generator.name(),
            "generating week"
        );

        match self.generator.generate_week(&ctx, week_number, phase).await {
            Ok(payload) => {
                WeekStateMachine::complete(&self.pool, user_id, week_number, &payload).await?;
                self.append_log(user_id, week_number, request_type, None).await;
                tracing::info!(user_id = %user_id, week = week_number, "week generated");
                Ok(WeekOutcome::Generated)
            }
            Err(e) => {
                let message = e.to_string();
                // Double failure (cannot even record the error) leaves the
                // week in `generating` for the stuck sweep; log locally and
                // keep going.
                if let Err(db_err) =
                    WeekStateMachine::fail(&self.pool, user_id, week_number, &message).await
                {
                    tracing::error!(
                        user_id = %user_id,
                        week = week_number,
                        error = %db_err,
                        "failed to record generation error; week left for stuck sweep"
                    );
                }
                self.append_log(user_id, week_number, request_type, Some(&message))
                    .await;
                tracing::warn!(
                    user_id = %user_id,
                    week = week_number,
                    error = %message,
                    "week generation failed"
                );
                Ok(WeekOutcome::Failed { message })
            }
        }
    }

    /// Run the bulk pass: weeks 2..=total_weeks in ascending order.
    ///
    /// Every week is attempted exactly once; failures and skips never abort
    /// the pass. A fixed delay separates consecutive attempts regardless of
    /// outcome.
    pub async fn run_bulk(&self, user_id: Uuid) -> Result<BulkSummary> {
        let swept = self.reconcile_stuck(user_id).await?;
        if swept > 0 {
            tracing::warn!(user_id = %user_id, swept, "reset stuck weeks before bulk run");
        }

        let ctx = self.load_context(user_id).await?;
        let mut summary = BulkSummary::default();

        for week_number in 2..=ctx.total_weeks {
            if week_number > 2 {
                tokio::time::sleep(self.config.inter_week_delay).await;
            }
            summary.attempted += 1;
            match self.generate_week(user_id, week_number, REQUEST_WEEKLY).await {
                Ok(WeekOutcome::Generated) => summary.generated += 1,
                Ok(WeekOutcome::Failed { .. }) => summary.failed += 1,
                Err(e) => {
                    // Lost claim race or missing row: someone else owns this
                    // week right now. Move on.
                    summary.skipped += 1;
                    tracing::warn!(
                        user_id = %user_id,
                        week = week_number,
                        error = %e,
                        "skipping week in bulk run"
                    );
                }
            }
        }

        tracing::info!(
            user_id = %user_id,
            attempted = summary.attempted,
            generated = summary.generated,
            failed = summary.failed,
            skipped = summary.skipped,
            "bulk run finished"
        );
        Ok(summary)
    }

    /// Detach the bulk pass from the caller. The spawned task outlives the
    /// request that triggered it; errors are logged, not surfaced.
    pub fn spawn_bulk(self: &Arc<Self>, user_id: Uuid) -> tokio::task::JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = worker.run_bulk(user_id).await {
                tracing::error!(user_id = %user_id, error = %e, "bulk generation run failed");
            }
        })
    }

    /// Detach a single-week attempt (the retry path).
    pub fn spawn_week(
        self: &Arc<Self>,
        user_id: Uuid,
        week_number: i32,
    ) -> tokio::task::JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = worker
                .generate_week(user_id, week_number, REQUEST_RETRY)
                .await
            {
                tracing::error!(
                    user_id = %user_id,
                    week = week_number,
                    error = %e,
                    "retry generation attempt failed to run"
                );
            }
        })
    }

    /// Sweep weeks stuck in `generating` past the configured threshold back
    /// to `error` so the retry path can pick them up. Returns how many were
    /// reset.
    pub async fn reconcile_stuck(&self, user_id: Uuid) -> Result<usize> {
        let swept = weeks::reset_stuck_weeks(
            &self.pool,
            user_id,
            self.config.stuck_threshold.as_secs_f64(),
        )
        .await?;
        for week in &swept {
            tracing::warn!(
                user_id = %user_id,
                week = week.week_number,
                "reset stuck week to error"
            );
        }
        Ok(swept.len())
    }

    async fn load_context(&self, user_id: Uuid) -> Result<PlanningContext> {
        contexts::get_context(&self.pool, user_id)
            .await?
            .with_context(|| format!("no planning context for user {user_id}"))
    }

    /// Append an audit row. Log failures are reported locally and swallowed:
    /// the audit trail must never take the pipeline down.
    async fn append_log(
        &self,
        user_id: Uuid,
        week_number: i32,
        request_type: &str,
        error: Option<&str>,
    ) {
        let entry = NewLogEntry {
            user_id,
            request_type: request_type.to_owned(),
            week_number: Some(week_number),
            success: error.is_none(),
            error: error.map(str::to_owned),
        };
        if let Err(e) = generation_log::insert_log_entry(&self.pool, &entry).await {
            tracing::error!(user_id = %user_id, week = week_number, error = %e, "failed to append generation log entry");
        }
    }
}
