//! The cadence plan generation pipeline.
//!
//! A plan is N weeks of training/nutrition content for one user. Week 1 is
//! produced synchronously at onboarding; the [`worker`] generates the rest
//! in a detached sequential pass, one rate-limited call per week, recording
//! per-week progress through the [`state`] machine. Failed weeks surface as
//! `error` rows that the [`retry`] coordinator (driven manually or by the
//! [`poller`]) resets and re-attempts without touching the rest of the plan.

pub mod generator;
pub mod phase;
pub mod plan;
pub mod poller;
pub mod retry;
pub mod state;
pub mod status;
pub mod worker;
