use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use cadence_core::retry::{self, RetryError};
use cadence_core::status::{self, StatusError};
use cadence_core::worker::GenerationWorker;
use cadence_db::queries::{contexts, generation_log, weeks};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<StatusError> for AppError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::NoPlan(user_id) => Self::not_found(format!("no plan for user {user_id}")),
            StatusError::Internal(e) => Self::internal(e),
        }
    }
}

impl From<RetryError> for AppError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::WeekNotFound { week_number } => {
                Self::not_found(format!("week {week_number} not found"))
            }
            RetryError::NotInError {
                week_number,
                status,
            } => Self::bad_request(format!(
                "week {week_number} has status {status}, only errored weeks can be retried"
            )),
            RetryError::Internal(e) => Self::internal(e),
        }
    }
}

// ---------------------------------------------------------------------------
// State and auth
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<GenerationWorker>,
}

/// Extract the authenticated user from the `x-user-id` header.
///
/// Transport-level authentication is assumed to happen upstream; this
/// surface only requires the gateway-injected identity header.
fn require_user(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let raw = headers
        .get("x-user-id")
        .ok_or_else(|| AppError::unauthorized("missing x-user-id header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid x-user-id header"))?;
    Uuid::parse_str(raw).map_err(|_| AppError::unauthorized("x-user-id is not a valid UUID"))
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryWeekRequest {
    pub week_number: i32,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(index))
        .route("/planning/status", get(get_status))
        .route("/planning/retry-week", post(retry_week));

    // Raw row dump; development only.
    if std::env::var("CADENCE_ENV").as_deref() == Ok("development") {
        router = router.route("/planning/debug", get(get_debug));
    }

    router.layer(CorsLayer::permissive()).with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(worker: Arc<GenerationWorker>, bind: &str, port: u16) -> Result<()> {
    let app = build_router(AppState { worker });
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("cadence serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("cadence serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Html<&'static str> {
    Html(
        "<!DOCTYPE html>\
<html><head><title>cadence</title></head><body>\
<h1>cadence</h1>\
<p>GET /planning/status | POST /planning/retry-week</p>\
<p>Requests require an <code>x-user-id</code> header.</p>\
</body></html>",
    )
}

async fn get_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<axum::response::Response, AppError> {
    let user_id = require_user(&headers)?;
    let report = status::plan_status(state.worker.pool(), user_id).await?;
    Ok(Json(report).into_response())
}

async fn retry_week(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RetryWeekRequest>,
) -> Result<axum::response::Response, AppError> {
    let user_id = require_user(&headers)?;
    retry::retry_week(&state.worker, user_id, req.week_number).await?;
    let body = serde_json::json!({
        "success": true,
        "message": format!("week {} queued for regeneration", req.week_number),
    });
    Ok(Json(body).into_response())
}

async fn get_debug(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<axum::response::Response, AppError> {
    let user_id = require_user(&headers)?;
    let pool = state.worker.pool();

    let context = contexts::get_context(pool, user_id)
        .await
        .map_err(AppError::internal)?;
    let weeks = weeks::list_weeks(pool, user_id)
        .await
        .map_err(AppError::internal)?;
    let log = generation_log::recent_entries_for_user(pool, user_id, 50)
        .await
        .map_err(AppError::internal)?;

    let body = serde_json::json!({
        "context": context,
        "weeks": weeks,
        "generationLog": log,
    });
    Ok(Json(body).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
