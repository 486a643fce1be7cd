//! `cadence onboard` command: create a plan from a TOML file and kick off
//! generation.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use cadence_core::plan;
use cadence_core::worker::GenerationWorker;
use cadence_db::models::PhaseDistribution;
use cadence_db::queries::contexts::NewPlanningContext;

/// On-disk onboarding request. The preference tables are free-form; they are
/// carried into the planning context verbatim.
#[derive(Debug, Deserialize)]
struct OnboardFile {
    /// Omit to have one generated.
    user_id: Option<Uuid>,
    total_weeks: i32,
    phase_distribution: PhaseDistribution,
    #[serde(default = "empty_table")]
    biometrics: toml::Value,
    #[serde(default = "empty_table")]
    training_preferences: toml::Value,
    #[serde(default = "empty_table")]
    nutrition_preferences: toml::Value,
    #[serde(default = "empty_table")]
    goal_targets: toml::Value,
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

impl OnboardFile {
    fn into_new_context(self) -> Result<NewPlanningContext> {
        let to_json = |v: toml::Value| -> Result<serde_json::Value> {
            serde_json::to_value(v).context("failed to convert TOML section to JSON")
        };
        Ok(NewPlanningContext {
            user_id: self.user_id.unwrap_or_else(Uuid::new_v4),
            biometrics: to_json(self.biometrics)?,
            training_preferences: to_json(self.training_preferences)?,
            nutrition_preferences: to_json(self.nutrition_preferences)?,
            goal_targets: to_json(self.goal_targets)?,
            phase_distribution: self.phase_distribution,
            total_weeks: self.total_weeks,
        })
    }
}

/// Run the onboard command.
///
/// Week 1 is generated before this prints anything; with `--follow` the
/// command stays attached until the bulk run for the remaining weeks
/// finishes, otherwise those weeks keep generating only as long as the
/// process lives.
pub async fn run_onboard(worker: &Arc<GenerationWorker>, file_path: &str, follow: bool) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read onboarding file: {file_path}"))?;
    let parsed: OnboardFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse onboarding file: {file_path}"))?;

    let new = parsed.into_new_context()?;
    let user_id = new.user_id;
    let total_weeks = new.total_weeks;

    println!("Generating week 1 for user {user_id}...");
    let initialized = plan::initialize_plan(worker, new).await?;

    println!("Plan created successfully.");
    println!();
    println!("  User ID:     {user_id}");
    println!("  Total weeks: {total_weeks}");
    println!("  Week 1:      generated");
    if total_weeks > 1 {
        println!("  Weeks 2-{total_weeks}: generating in the background");
    }

    if follow && total_weeks > 1 {
        println!();
        println!("Following background generation (Ctrl+C to detach)...");
        initialized
            .bulk_run
            .await
            .context("background generation task panicked")?;
        println!("Background generation finished. Run `cadence status {user_id}` for details.");
    } else if total_weeks > 1 {
        println!();
        println!("Note: background generation runs inside this process.");
        println!("Use --follow to wait for it, or `cadence serve` for a long-lived host.");
        initialized.bulk_run.abort();
    }

    Ok(())
}
