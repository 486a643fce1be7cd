use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Generation status of a single plan week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WeekStatus {
    Pending,
    Generating,
    Generated,
    Error,
}

impl fmt::Display for WeekStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Generated => "generated",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for WeekStatus {
    type Err = WeekStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "generating" => Ok(Self::Generating),
            "generated" => Ok(Self::Generated),
            "error" => Ok(Self::Error),
            other => Err(WeekStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`WeekStatus`] string.
#[derive(Debug, Clone)]
pub struct WeekStatusParseError(pub String);

impl fmt::Display for WeekStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid week status: {:?}", self.0)
    }
}

impl std::error::Error for WeekStatusParseError {}

// ---------------------------------------------------------------------------

/// Periodization phase governing training emphasis for a range of weeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Base,
    Build,
    Peak,
    Taper,
    Recovery,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Base => "base",
            Self::Build => "build",
            Self::Peak => "peak",
            Self::Taper => "taper",
            Self::Recovery => "recovery",
        };
        f.write_str(s)
    }
}

impl FromStr for Phase {
    type Err = PhaseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Self::Base),
            "build" => Ok(Self::Build),
            "peak" => Ok(Self::Peak),
            "taper" => Ok(Self::Taper),
            "recovery" => Ok(Self::Recovery),
            other => Err(PhaseParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Phase`] string.
#[derive(Debug, Clone)]
pub struct PhaseParseError(pub String);

impl fmt::Display for PhaseParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid phase: {:?}", self.0)
    }
}

impl std::error::Error for PhaseParseError {}

// ---------------------------------------------------------------------------
// Phase distribution
// ---------------------------------------------------------------------------

/// Week counts per periodization phase.
///
/// `recovery` carries a count for documentation purposes only -- the phase
/// determiner treats recovery as unbounded and assigns it every week past
/// the taper boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDistribution {
    pub base: i32,
    pub build: i32,
    pub peak: i32,
    pub taper: i32,
    pub recovery: i32,
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A user's planning context -- the immutable input to every generation
/// call for that user's plan. Written once at onboarding.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanningContext {
    pub user_id: Uuid,
    pub biometrics: serde_json::Value,
    pub training_preferences: serde_json::Value,
    pub nutrition_preferences: serde_json::Value,
    pub goal_targets: serde_json::Value,
    /// Stored as JSONB; decode with [`PlanningContext::distribution`].
    pub phase_distribution: serde_json::Value,
    pub total_weeks: i32,
    pub created_at: DateTime<Utc>,
}

impl PlanningContext {
    /// Decode the stored phase distribution.
    pub fn distribution(&self) -> anyhow::Result<PhaseDistribution> {
        serde_json::from_value(self.phase_distribution.clone())
            .map_err(|e| anyhow::anyhow!("invalid phase_distribution for user {}: {e}", self.user_id))
    }
}

/// One week of a user's plan -- the unit of generation and status tracking.
///
/// Invariants (enforced by the conditional transitions in
/// [`crate::queries::weeks`]): `plan_payload` is non-null iff status is
/// `generated`; `generation_error` is non-null iff status is `error`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanWeek {
    pub user_id: Uuid,
    pub week_number: i32,
    pub status: WeekStatus,
    pub plan_payload: Option<serde_json::Value>,
    pub generation_error: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every status transition; the stuck-week sweep keys off it.
    pub updated_at: DateTime<Utc>,
}

/// An append-only audit record of one generation attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenerationLogEntry {
    pub id: i64,
    pub user_id: Uuid,
    pub request_type: String,
    pub week_number: Option<i32>,
    pub success: bool,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_status_display_roundtrip() {
        let variants = [
            WeekStatus::Pending,
            WeekStatus::Generating,
            WeekStatus::Generated,
            WeekStatus::Error,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: WeekStatus = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn week_status_invalid() {
        let result = "bogus".parse::<WeekStatus>();
        assert!(result.is_err());
    }

    #[test]
    fn phase_display_roundtrip() {
        let variants = [
            Phase::Base,
            Phase::Build,
            Phase::Peak,
            Phase::Taper,
            Phase::Recovery,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: Phase = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn phase_invalid() {
        let result = "deload".parse::<Phase>();
        assert!(result.is_err());
    }

    #[test]
    fn distribution_decodes_from_jsonb() {
        let ctx = PlanningContext {
            user_id: Uuid::new_v4(),
            biometrics: serde_json::json!({}),
            training_preferences: serde_json::json!({}),
            nutrition_preferences: serde_json::json!({}),
            goal_targets: serde_json::json!({}),
            phase_distribution: serde_json::json!({
                "base": 4, "build": 4, "peak": 2, "taper": 1, "recovery": 0
            }),
            total_weeks: 12,
            created_at: Utc::now(),
        };
        let dist = ctx.distribution().expect("should decode");
        assert_eq!(dist.base, 4);
        assert_eq!(dist.taper, 1);
    }

    #[test]
    fn distribution_rejects_malformed_jsonb() {
        let ctx = PlanningContext {
            user_id: Uuid::new_v4(),
            biometrics: serde_json::json!({}),
            training_preferences: serde_json::json!({}),
            nutrition_preferences: serde_json::json!({}),
            goal_targets: serde_json::json!({}),
            phase_distribution: serde_json::json!({ "base": "four" }),
            total_weeks: 12,
            created_at: Utc::now(),
        };
        assert!(ctx.distribution().is_err());
    }
}
