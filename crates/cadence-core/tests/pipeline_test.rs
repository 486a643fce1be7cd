//! End-to-end pipeline tests: onboarding, the bulk run, retry, and status
//! aggregation against a real database.
//!
//! Each test runs against its own temporary database via
//! `cadence-test-utils` and drives the worker with a scripted generator so
//! failures land on exactly the weeks the test chooses.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use cadence_core::generator::{GenerateError, WeekGenerator};
use cadence_core::plan::{self, REQUEST_ONBOARDING};
use cadence_core::retry::{self, RetryError};
use cadence_core::status::{self, StatusError};
use cadence_core::worker::{GenerationWorker, WeekOutcome, WorkerConfig};
use cadence_db::models::{Phase, PlanningContext, WeekStatus};
use cadence_db::queries::generation_log;
use cadence_db::queries::weeks;
use cadence_test_utils::{TestDb, fixtures};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Generator that fails each week in `fail_weeks` once, then succeeds on
/// subsequent attempts for the same week. Records every call.
struct FlakyGenerator {
    fail_weeks: Mutex<HashSet<i32>>,
    calls: Mutex<Vec<i32>>,
}

impl FlakyGenerator {
    fn new(fail_weeks: impl IntoIterator<Item = i32>) -> Self {
        Self {
            fail_weeks: Mutex::new(fail_weeks.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn reliable() -> Self {
        Self::new([])
    }

    fn calls(&self) -> Vec<i32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeekGenerator for FlakyGenerator {
    async fn generate_week(
        &self,
        _ctx: &PlanningContext,
        week_number: i32,
        phase: Phase,
    ) -> Result<serde_json::Value, GenerateError> {
        self.calls.lock().unwrap().push(week_number);
        if self.fail_weeks.lock().unwrap().remove(&week_number) {
            return Err(GenerateError::RateLimited(format!(
                "scripted failure for week {week_number}"
            )));
        }
        Ok(serde_json::json!({
            "week_number": week_number,
            "phase": phase.to_string(),
        }))
    }

    fn name(&self) -> &str {
        "flaky-test"
    }
}

fn fast_config() -> WorkerConfig {
    WorkerConfig {
        inter_week_delay: Duration::from_millis(1),
        stuck_threshold: Duration::from_secs(15 * 60),
    }
}

fn make_worker(pool: &sqlx::PgPool, generator: Arc<FlakyGenerator>) -> Arc<GenerationWorker> {
    Arc::new(GenerationWorker::new(
        pool.clone(),
        generator,
        fast_config(),
    ))
}

/// Poll until the week reaches the given status or the deadline passes.
/// Needed after `retry_week`, which dispatches generation fire-and-forget.
async fn wait_for_status(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    week_number: i32,
    want: WeekStatus,
) -> bool {
    for _ in 0..100 {
        let week = weeks::get_week(pool, user_id, week_number)
            .await
            .expect("get_week should succeed")
            .expect("week row should exist");
        if week.status == want {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Onboarding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn onboarding_creates_plan_and_generates_every_week() {
    let db = TestDb::create().await;
    let pool = &db.pool;
    let generator = Arc::new(FlakyGenerator::reliable());
    let worker = make_worker(pool, Arc::clone(&generator));
    let user_id = Uuid::new_v4();

    let plan = plan::initialize_plan(&worker, fixtures::new_context(user_id, 6))
        .await
        .expect("onboarding should succeed");
    assert_eq!(plan.context.total_weeks, 6);

    // Week 1 is generated before initialize_plan returns.
    let first = weeks::get_week(pool, user_id, 1)
        .await
        .expect("get_week should succeed")
        .expect("week 1 should exist");
    assert_eq!(first.status, WeekStatus::Generated);
    assert!(first.plan_payload.is_some());
    assert!(first.generated_at.is_some());

    // Remaining weeks finish in the detached bulk run.
    plan.bulk_run.await.expect("bulk run task should not panic");

    let listed = weeks::list_weeks(pool, user_id)
        .await
        .expect("list_weeks should succeed");
    assert_eq!(listed.len(), 6);
    for week in &listed {
        assert_eq!(week.status, WeekStatus::Generated, "week {}", week.week_number);
        assert!(week.plan_payload.is_some());
    }

    // Strictly ascending generation order, week 1 first.
    assert_eq!(generator.calls(), vec![1, 2, 3, 4, 5, 6]);

    let report = status::plan_status(pool, user_id)
        .await
        .expect("status should succeed");
    assert!(report.is_complete);
    assert_eq!(report.generated_count, 6);
    assert_eq!(report.pending_count, 0);

    db.drop_db().await;
}

#[tokio::test]
async fn onboarding_week_one_failure_writes_no_rows() {
    let db = TestDb::create().await;
    let pool = &db.pool;
    let generator = Arc::new(FlakyGenerator::new([1]));
    let worker = make_worker(pool, generator);
    let user_id = Uuid::new_v4();

    let result = plan::initialize_plan(&worker, fixtures::new_context(user_id, 4)).await;
    assert!(result.is_err(), "week-1 failure must fail onboarding");

    // No partial plan left behind.
    let listed = weeks::list_weeks(pool, user_id)
        .await
        .expect("list_weeks should succeed");
    assert!(listed.is_empty());
    assert!(matches!(
        status::plan_status(pool, user_id).await,
        Err(StatusError::NoPlan(_))
    ));

    // The failed attempt is still audited.
    let entries = generation_log::recent_entries_for_user(pool, user_id, 10)
        .await
        .expect("log read should succeed");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].request_type, REQUEST_ONBOARDING);
    assert!(!entries[0].success);

    db.drop_db().await;
}

#[tokio::test]
async fn onboarding_rejects_duplicate_plan() {
    let db = TestDb::create().await;
    let pool = &db.pool;
    let generator = Arc::new(FlakyGenerator::reliable());
    let worker = make_worker(pool, generator);
    let user_id = Uuid::new_v4();

    let plan = plan::initialize_plan(&worker, fixtures::new_context(user_id, 2))
        .await
        .expect("first onboarding should succeed");
    plan.bulk_run.await.expect("bulk run task should not panic");

    let second = plan::initialize_plan(&worker, fixtures::new_context(user_id, 2)).await;
    assert!(second.is_err(), "second onboarding for the same user must fail");

    db.drop_db().await;
}

#[tokio::test]
async fn onboarding_rejects_zero_weeks() {
    let db = TestDb::create().await;
    let generator = Arc::new(FlakyGenerator::reliable());
    let worker = make_worker(&db.pool, Arc::clone(&generator));

    let result = plan::initialize_plan(&worker, fixtures::new_context(Uuid::new_v4(), 0)).await;
    assert!(result.is_err());
    assert!(generator.calls().is_empty(), "no generation for an empty plan");

    db.drop_db().await;
}

// ---------------------------------------------------------------------------
// Bulk run failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_week_does_not_stop_the_bulk_run() {
    let db = TestDb::create().await;
    let pool = &db.pool;
    let generator = Arc::new(FlakyGenerator::new([3]));
    let worker = make_worker(pool, Arc::clone(&generator));
    let user_id = Uuid::new_v4();

    let plan = plan::initialize_plan(&worker, fixtures::new_context(user_id, 6))
        .await
        .expect("onboarding should succeed");
    plan.bulk_run.await.expect("bulk run task should not panic");

    // Weeks after the failure were still attempted, in order.
    assert_eq!(generator.calls(), vec![1, 2, 3, 4, 5, 6]);

    let report = status::plan_status(pool, user_id)
        .await
        .expect("status should succeed");
    assert_eq!(report.total_weeks, 6);
    assert_eq!(report.generated_count, 5);
    assert!(!report.is_complete);

    let week3 = weeks::get_week(pool, user_id, 3)
        .await
        .expect("get_week should succeed")
        .expect("week 3 should exist");
    assert_eq!(week3.status, WeekStatus::Error);
    assert!(week3.plan_payload.is_none());
    assert!(
        week3
            .generation_error
            .as_deref()
            .is_some_and(|e| e.contains("rate limited")),
        "error message should survive to the row"
    );

    // Retrying the errored week completes the plan.
    retry::retry_week(&worker, user_id, 3)
        .await
        .expect("retry of errored week should be accepted");
    assert!(
        wait_for_status(pool, user_id, 3, WeekStatus::Generated).await,
        "retried week should reach generated"
    );

    let report = status::plan_status(pool, user_id)
        .await
        .expect("status should succeed");
    assert_eq!(report.generated_count, 6);
    assert!(report.is_complete);

    db.drop_db().await;
}

// ---------------------------------------------------------------------------
// Retry coordinator
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_rejects_weeks_not_in_error() {
    let db = TestDb::create().await;
    let pool = &db.pool;
    let generator = Arc::new(FlakyGenerator::reliable());
    let worker = make_worker(pool, Arc::clone(&generator));
    let user_id = Uuid::new_v4();

    let plan = plan::initialize_plan(&worker, fixtures::new_context(user_id, 3))
        .await
        .expect("onboarding should succeed");
    plan.bulk_run.await.expect("bulk run task should not panic");
    let calls_before = generator.calls().len();

    // Every week is generated; none can be retried.
    let err = retry::retry_week(&worker, user_id, 2)
        .await
        .expect_err("retry of a generated week must be rejected");
    assert!(matches!(
        err,
        RetryError::NotInError {
            week_number: 2,
            status: WeekStatus::Generated,
        }
    ));

    let err = retry::retry_week(&worker, user_id, 99)
        .await
        .expect_err("retry of a missing week must be rejected");
    assert!(matches!(err, RetryError::WeekNotFound { week_number: 99 }));

    // Rejections mutate nothing and dispatch nothing.
    assert_eq!(generator.calls().len(), calls_before);
    let week2 = weeks::get_week(pool, user_id, 2)
        .await
        .expect("get_week should succeed")
        .expect("week 2 should exist");
    assert_eq!(week2.status, WeekStatus::Generated);
    assert!(week2.plan_payload.is_some());

    db.drop_db().await;
}

#[tokio::test]
async fn retry_rejects_pending_and_generating_weeks() {
    let db = TestDb::create().await;
    let pool = &db.pool;
    let generator = Arc::new(FlakyGenerator::reliable());
    let worker = make_worker(pool, Arc::clone(&generator));
    let user_id = fixtures::seed_pending_plan(pool, 3).await;

    // Week 2 has never been attempted.
    let err = retry::retry_week(&worker, user_id, 2)
        .await
        .expect_err("retry of a pending week must be rejected");
    assert!(matches!(
        err,
        RetryError::NotInError {
            week_number: 2,
            status: WeekStatus::Pending,
        }
    ));
    let week2 = weeks::get_week(pool, user_id, 2)
        .await
        .expect("get_week should succeed")
        .expect("week 2 should exist");
    assert_eq!(week2.status, WeekStatus::Pending, "no mutation on rejection");

    // Week 3 is mid-generation.
    weeks::claim_week(pool, user_id, 3)
        .await
        .expect("claim should succeed");
    let err = retry::retry_week(&worker, user_id, 3)
        .await
        .expect_err("retry of a generating week must be rejected");
    assert!(matches!(
        err,
        RetryError::NotInError {
            week_number: 3,
            status: WeekStatus::Generating,
        }
    ));
    let week3 = weeks::get_week(pool, user_id, 3)
        .await
        .expect("get_week should succeed")
        .expect("week 3 should exist");
    assert_eq!(week3.status, WeekStatus::Generating, "no mutation on rejection");

    // No generation was dispatched for either rejection.
    assert!(generator.calls().is_empty());

    db.drop_db().await;
}

#[tokio::test]
async fn retry_attempts_are_audited() {
    let db = TestDb::create().await;
    let pool = &db.pool;
    let generator = Arc::new(FlakyGenerator::new([2]));
    let worker = make_worker(pool, generator);
    let user_id = Uuid::new_v4();

    let plan = plan::initialize_plan(&worker, fixtures::new_context(user_id, 2))
        .await
        .expect("onboarding should succeed");
    plan.bulk_run.await.expect("bulk run task should not panic");

    retry::retry_week(&worker, user_id, 2)
        .await
        .expect("retry should be accepted");
    assert!(wait_for_status(pool, user_id, 2, WeekStatus::Generated).await);

    // onboarding week 1, weekly week 2 (failed), retry week 2.
    let attempts = generation_log::count_attempts_for_week(pool, user_id, 2)
        .await
        .expect("log count should succeed");
    assert_eq!(attempts, 2);

    db.drop_db().await;
}

// ---------------------------------------------------------------------------
// Single-week worker procedure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generate_week_reports_failure_as_outcome_not_error() {
    let db = TestDb::create().await;
    let pool = &db.pool;
    let generator = Arc::new(FlakyGenerator::new([2]));
    let worker = make_worker(pool, generator);
    let user_id = Uuid::new_v4();

    let plan = plan::initialize_plan(&worker, fixtures::new_context(user_id, 2))
        .await
        .expect("onboarding should succeed");
    plan.bulk_run.await.expect("bulk run task should not panic");

    // Week 2 errored in the bulk run; driving it again without the
    // error -> pending reset loses the claim and surfaces as Err.
    let result = worker
        .generate_week(user_id, 2, cadence_core::worker::REQUEST_RETRY)
        .await;
    assert!(result.is_err(), "claim of a non-pending week must fail");

    // After a reset the same call succeeds.
    let rows = weeks::retry_to_pending(pool, user_id, 2)
        .await
        .expect("reset should succeed");
    assert_eq!(rows, 1);
    let outcome = worker
        .generate_week(user_id, 2, cadence_core::worker::REQUEST_RETRY)
        .await
        .expect("attempt should run");
    assert_eq!(outcome, WeekOutcome::Generated);

    db.drop_db().await;
}
