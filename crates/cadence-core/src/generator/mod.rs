//! The week generation seam.
//!
//! Producing one week of plan content is an expensive, unreliable,
//! rate-limited call to an external provider. The pipeline only ever talks
//! to it through [`WeekGenerator`], so the worker, retry coordinator, and
//! tests are all provider-agnostic.

pub mod template;

use async_trait::async_trait;
use thiserror::Error;

use cadence_db::models::{Phase, PlanningContext};

pub use template::TemplateGenerator;

/// Failure modes of a generation call.
///
/// The worker treats every variant identically (capture, log, mark the week
/// `error`); the distinction exists for log readability and for providers
/// that want to signal why they failed.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The provider did not answer within its own deadline.
    #[error("generation timed out: {0}")]
    Timeout(String),

    /// The provider rejected the call due to rate limiting.
    #[error("generation rate limited: {0}")]
    RateLimited(String),

    /// The provider answered, but the content could not be used.
    #[error("malformed generation output: {0}")]
    MalformedOutput(String),

    /// Any other provider-side failure.
    #[error("provider error: {0}")]
    Provider(String),
}

/// Produces one week of structured plan content.
///
/// Implementations must be cheap to share (`Arc<dyn WeekGenerator>`); the
/// worker holds one instance for the lifetime of a bulk run. The call may
/// take seconds -- any timeout is the implementation's responsibility, the
/// pipeline imposes none of its own.
#[async_trait]
pub trait WeekGenerator: Send + Sync {
    /// Generate the plan payload for `week_number` of the given context.
    async fn generate_week(
        &self,
        ctx: &PlanningContext,
        week_number: i32,
        phase: Phase,
    ) -> Result<serde_json::Value, GenerateError>;

    /// Short provider name, used in logs.
    fn name(&self) -> &str;
}
