//! Telemetry Module
//!
//! Temperature sensors, host CPU/RAM usage, and per-run thermal history.

pub mod host;
pub mod sensors;
pub mod thermal;

pub use host::{FixedProbe, HostProbe, HostSnapshot, SysinfoProbe};
pub use sensors::{normalize_readings, NoSensors, SysinfoSensors, TempReading, TemperatureSource};
pub use thermal::{TempSample, ThermalHistory};
