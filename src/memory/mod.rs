//! Memory Module
//!
//! Bounded RAM pressure, grown independently of the worker processes.

mod pressure;

pub use pressure::{MemoryPressure, PressurePlan, PressureStatus, MB};
