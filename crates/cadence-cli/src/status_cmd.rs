//! `cadence status` command: show plan progress and per-week status.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use cadence_core::status::{self, StatusError};
use cadence_db::models::WeekStatus;

/// Run the status command.
pub async fn run_status(pool: &PgPool, user_id_str: &str) -> Result<()> {
    let user_id =
        Uuid::parse_str(user_id_str).with_context(|| format!("invalid user ID: {user_id_str}"))?;

    let report = match status::plan_status(pool, user_id).await {
        Ok(report) => report,
        Err(StatusError::NoPlan(_)) => {
            println!("No plan found for user {user_id}.");
            println!("Use `cadence onboard <file>` to create one.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Plan for user {user_id}");
    println!(
        "Progress: {}/{} generated{}",
        report.generated_count,
        report.total_weeks,
        if report.is_complete { " (complete)" } else { "" }
    );
    println!();

    println!("{:<6} {:<12} {:<22} {}", "WEEK", "STATUS", "GENERATED AT", "ERROR");
    println!("{}", "-".repeat(72));
    for week in &report.weeks {
        let status_icon = match week.status {
            WeekStatus::Pending => ".",
            WeekStatus::Generating => "*",
            WeekStatus::Generated => "+",
            WeekStatus::Error => "!",
        };
        let generated_at = week
            .generated_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let error = week.error.as_deref().unwrap_or("");
        println!(
            "[{}] {:<3} {:<12} {:<22} {}",
            status_icon, week.week_number, week.status, generated_at, error
        );
    }

    Ok(())
}
