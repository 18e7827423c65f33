//! HydraHog Stress Engine
//!
//! Workload generation and supervision for stressing a machine:
//! - CPU-bound worker processes with a configurable duty cycle
//! - Paced memory pressure allocation
//! - Windowed auto-respawn of killed workers ("hydra mode")
//! - Pause-aware run timing and thermal sampling
//! - Deterministic post-run stability report

pub mod clock;
pub mod config;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod run_log;
pub mod telemetry;
pub mod worker;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, RunClock, SystemClock};
pub use config::{EngineSettings, RunConfig};
pub use error::{HogError, HogResult};
pub use orchestrator::{Hog, HogStats, RunPhase, RunReport};
pub use run_log::LogEntry;
