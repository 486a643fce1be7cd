//! Periodization phase determiner.
//!
//! Maps a 1-based week number to a phase given the plan's phase-length
//! distribution. Pure and total: every week number >= 1 maps to exactly one
//! phase, and the phase index never decreases as the week number grows.

use cadence_db::models::{Phase, PhaseDistribution};

/// Resolve the periodization phase for a week.
///
/// Phase lengths accumulate in fixed order (base, build, peak, taper); the
/// first phase whose cumulative upper bound reaches `week_number` wins.
/// Recovery has no upper bound -- every week past the taper boundary is
/// recovery, regardless of the distribution's `recovery` count.
pub fn phase_for(week_number: u32, distribution: &PhaseDistribution) -> Phase {
    debug_assert!(week_number >= 1, "week numbers are 1-based");

    let bounded = [
        (Phase::Base, distribution.base),
        (Phase::Build, distribution.build),
        (Phase::Peak, distribution.peak),
        (Phase::Taper, distribution.taper),
    ];

    let mut upper = 0u32;
    for (phase, len) in bounded {
        upper = upper.saturating_add(len.max(0) as u32);
        if week_number <= upper {
            return phase;
        }
    }
    Phase::Recovery
}
