//! `cadence log` command: show the generation audit trail for a user.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use cadence_db::queries::generation_log;

/// Run the log command. Entries print newest first.
pub async fn run_log(pool: &PgPool, user_id_str: &str, limit: i64) -> Result<()> {
    let user_id =
        Uuid::parse_str(user_id_str).with_context(|| format!("invalid user ID: {user_id_str}"))?;

    let entries = generation_log::recent_entries_for_user(pool, user_id, limit).await?;

    if entries.is_empty() {
        println!("No generation attempts recorded for user {user_id}.");
        return Ok(());
    }

    println!("Generation log for user {user_id} ({} entries):", entries.len());
    for entry in &entries {
        let time = entry.recorded_at.format("%Y-%m-%d %H:%M:%S");
        let week = entry
            .week_number
            .map(|w| format!("week {w}"))
            .unwrap_or_else(|| "-".to_string());
        let outcome = if entry.success { "ok" } else { "FAILED" };
        let detail = entry.error.as_deref().unwrap_or("");
        println!(
            "  [{time}] {:<12} {:<8} {:<6} {detail}",
            entry.request_type, week, outcome
        );
    }

    Ok(())
}
