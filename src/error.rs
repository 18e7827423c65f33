//! Error taxonomy for the stress engine.
//!
//! None of these are fatal to a run. The supervisor renders them into the
//! run log and keeps going with degraded data.

use thiserror::Error;

use crate::worker::WorkerId;

pub type HogResult<T> = std::result::Result<T, HogError>;

#[derive(Debug, Error)]
pub enum HogError {
    /// Memory pool could not grow to its target.
    #[error("RAM allocation stopped early at {achieved_mb} MB of {requested_mb} MB")]
    ResourceExhaustion { requested_mb: u64, achieved_mb: u64 },

    #[error("Temperature sensors not available: {0}")]
    SensorUnavailable(String),

    #[error("Failed to spawn worker {worker}: {reason}")]
    Spawn { worker: WorkerId, reason: String },

    #[error("Worker {worker} exhausted its respawn budget ({attempts} respawns); retired for this run")]
    RespawnBudgetExhausted { worker: WorkerId, attempts: u32 },

    #[error("Cannot {op} while {phase}")]
    InvalidTransition { op: &'static str, phase: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shared flag error: {0}")]
    Flag(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
