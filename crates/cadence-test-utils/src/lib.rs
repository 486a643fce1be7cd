//! Test support for cadence integration tests.
//!
//! [`TestDb`] hands each test its own freshly-migrated database inside one
//! PostgreSQL server shared per test binary. The server is either an
//! external one named by `CADENCE_TEST_PG_URL` (nextest setup script) or a
//! testcontainers instance started lazily on first use.
//!
//! [`fixtures`] holds the plan seeding helpers the db and core test suites
//! share.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use cadence_db::pool;

/// Server shared by every test in the binary. The container handle, when
/// present, keeps the instance alive for the process lifetime.
struct PgServer {
    base_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static PG_SERVER: OnceCell<PgServer> = OnceCell::const_new();

impl PgServer {
    async fn get() -> &'static PgServer {
        PG_SERVER.get_or_init(PgServer::start).await
    }

    async fn start() -> PgServer {
        if let Ok(url) = std::env::var("CADENCE_TEST_PG_URL") {
            return PgServer {
                base_url: url,
                _container: None,
            };
        }

        let container = Postgres::default()
            .with_tag("18")
            .start()
            .await
            .expect("failed to start PostgreSQL container");
        let host = container.get_host().await.expect("failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("failed to get mapped port");

        PgServer {
            base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
            _container: Some(container),
        }
    }

    /// One-shot connection to the server's `postgres` database for
    /// CREATE/DROP DATABASE statements.
    async fn admin_conn(&self) -> PgConnection {
        PgConnection::connect(&format!("{}/postgres", self.base_url))
            .await
            .expect("failed to connect to maintenance database")
    }
}

/// A uniquely-named, fully-migrated database for one test.
///
/// Create with [`TestDb::create`], finish with [`TestDb::drop_db`]. A test
/// that panics leaks its database inside the throwaway container, which is
/// fine.
pub struct TestDb {
    pub pool: PgPool,
    name: String,
}

impl TestDb {
    pub async fn create() -> Self {
        let server = PgServer::get().await;

        let name = format!("cadence_test_{}", Uuid::new_v4().simple());
        let mut admin = server.admin_conn().await;
        admin
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .unwrap_or_else(|e| panic!("failed to create test database {name}: {e}"));
        admin.close().await.ok();

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("{}/{name}", server.base_url))
            .await
            .unwrap_or_else(|e| panic!("failed to connect to test database {name}: {e}"));

        pool::run_migrations(&pool)
            .await
            .expect("migrations should succeed");

        Self { pool, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the pool and drop the database, kicking out any straggler
    /// connections first.
    pub async fn drop_db(self) {
        self.pool.close().await;

        let server = PgServer::get().await;
        let mut admin = server.admin_conn().await;
        let terminate = format!(
            "SELECT pg_terminate_backend(pid) \
             FROM pg_stat_activity \
             WHERE datname = '{}' AND pid <> pg_backend_pid()",
            self.name
        );
        let _ = admin.execute(terminate.as_str()).await;
        let _ = admin
            .execute(format!("DROP DATABASE IF EXISTS {}", self.name).as_str())
            .await;
        admin.close().await.ok();
    }
}

pub mod fixtures {
    //! Canned plan data shared by the db and core test suites.

    use sqlx::PgPool;
    use uuid::Uuid;

    use cadence_db::models::{PhaseDistribution, WeekStatus};
    use cadence_db::queries::contexts::{self, NewPlanningContext};
    use cadence_db::queries::weeks;

    /// A 12-week marathon-style distribution: 4 base, 4 build, 2 peak,
    /// 1 taper, 1 recovery.
    pub fn marathon_distribution() -> PhaseDistribution {
        PhaseDistribution {
            base: 4,
            build: 4,
            peak: 2,
            taper: 1,
            recovery: 1,
        }
    }

    /// An onboarding request for a fresh user with plausible preference
    /// payloads.
    pub fn new_context(user_id: Uuid, total_weeks: i32) -> NewPlanningContext {
        NewPlanningContext {
            user_id,
            biometrics: serde_json::json!({"weight_kg": 72, "height_cm": 180}),
            training_preferences: serde_json::json!({"days_per_week": 4}),
            nutrition_preferences: serde_json::json!({"diet": "omnivore"}),
            goal_targets: serde_json::json!({"race": "marathon"}),
            phase_distribution: marathon_distribution(),
            total_weeks,
        }
    }

    /// Insert a context plus `total_weeks` pending week rows and return the
    /// user id. Week 1 is pending too; tests that need a generated week
    /// drive it through the status transitions.
    pub async fn seed_pending_plan(pool: &PgPool, total_weeks: i32) -> Uuid {
        let user_id = Uuid::new_v4();
        contexts::insert_context(pool, &new_context(user_id, total_weeks))
            .await
            .expect("insert_context should succeed");
        for week in 1..=total_weeks {
            weeks::insert_week(pool, user_id, week, WeekStatus::Pending, None)
                .await
                .expect("insert_week should succeed");
        }
        user_id
    }
}
