//! Deterministic built-in generator.
//!
//! Renders a skeleton week from the phase emphasis alone. This is the
//! development and CLI fallback; production deployments wire a real
//! LLM-backed provider behind the same trait.

use async_trait::async_trait;

use cadence_db::models::{Phase, PlanningContext};

use super::{GenerateError, WeekGenerator};

/// Built-in provider that renders a fixed weekly skeleton per phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    fn sessions_for(phase: Phase) -> (&'static [&'static str], &'static str) {
        match phase {
            Phase::Base => (
                &["easy aerobic", "easy aerobic", "long slow distance", "strength"],
                "aerobic volume",
            ),
            Phase::Build => (
                &["tempo", "intervals", "easy aerobic", "long run", "strength"],
                "threshold and volume",
            ),
            Phase::Peak => (
                &["race-pace intervals", "tempo", "easy aerobic", "long run"],
                "race specificity",
            ),
            Phase::Taper => (&["short intervals", "easy aerobic", "rest"], "freshness"),
            Phase::Recovery => (&["easy aerobic", "mobility", "rest"], "regeneration"),
        }
    }
}

#[async_trait]
impl WeekGenerator for TemplateGenerator {
    async fn generate_week(
        &self,
        ctx: &PlanningContext,
        week_number: i32,
        phase: Phase,
    ) -> Result<serde_json::Value, GenerateError> {
        let (sessions, emphasis) = Self::sessions_for(phase);
        Ok(serde_json::json!({
            "week_number": week_number,
            "phase": phase.to_string(),
            "emphasis": emphasis,
            "sessions": sessions,
            "training_preferences": ctx.training_preferences,
            "nutrition": {
                "preferences": ctx.nutrition_preferences,
                "guidance": format!("support {emphasis} for week {week_number}"),
            },
        }))
    }

    fn name(&self) -> &str {
        "template"
    }
}
