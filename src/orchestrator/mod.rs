//! Orchestrator Module
//!
//! Drives a stress run: worker supervision, windowed respawns and the
//! final diagnostic report.

pub mod report;
pub mod respawn;
pub mod supervisor;

pub use report::{
    score, Completion, HeatingTier, ReportSettings, RunReport, RunStats, Stability,
    ThermalSummary, ThermalTrend, TrendSummary,
};
pub use respawn::{RespawnDecision, RespawnLimits, RespawnPolicy, RespawnState};
pub use supervisor::{Hog, HogStats, RunPhase};
