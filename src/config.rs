//! Run configuration and engine tunables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{HogError, HogResult};
use crate::orchestrator::report::ReportSettings;

/// Parameters of a single stress run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub cpu_workers: u32,
    pub ram_target_mb: u64,
    pub duration_secs: u64,
    /// Fraction of each 100ms work cycle spent burning CPU.
    pub duty_cycle: f64,
    /// Auto-respawn dead workers ("hydra mode").
    pub hydra: bool,
}

impl RunConfig {
    pub fn new(
        cpu_workers: u32,
        ram_target_mb: u64,
        duration_secs: u64,
        duty_cycle: f64,
        hydra: bool,
    ) -> HogResult<Self> {
        if cpu_workers == 0 {
            return Err(HogError::InvalidConfig("cpu worker count must be positive".to_string()));
        }
        if duration_secs == 0 {
            return Err(HogError::InvalidConfig("duration must be positive".to_string()));
        }
        if !(duty_cycle > 0.0 && duty_cycle <= 1.0) {
            return Err(HogError::InvalidConfig(format!(
                "duty cycle must be in (0, 1], got {}",
                duty_cycle
            )));
        }
        Ok(Self {
            cpu_workers,
            ram_target_mb,
            duration_secs,
            duty_cycle,
            hydra,
        })
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Engine tunables shared by every run of a supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Cadence the front-end should call `tick()` at.
    pub tick_interval: Duration,
    pub respawn_window: Duration,
    pub max_respawns: u32,
    /// How long `stop()` waits for workers to honor their stop flag.
    pub stop_grace: Duration,
    pub ram_chunk_mb: u64,
    pub ram_pace: Duration,
    /// Clamp the RAM target to this share of available memory. `None` disables.
    pub ram_clamp_ratio: Option<f64>,
    /// Requests above this share of total memory get a critical advisory.
    pub ram_advisory_ratio: f64,
    pub report: ReportSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(400),
            respawn_window: Duration::from_secs(10),
            max_respawns: 5,
            stop_grace: Duration::from_secs(1),
            ram_chunk_mb: 50,
            ram_pace: Duration::from_millis(50),
            ram_clamp_ratio: Some(0.7),
            ram_advisory_ratio: 0.9,
            report: ReportSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Defaults overridden by `HYDRA_HOG_*` environment variables.
    pub fn from_env() -> HogResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> HogResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "HYDRA_HOG_TICK_MS")? {
            if ms == 0 {
                return Err(HogError::InvalidConfig("HYDRA_HOG_TICK_MS must be positive".to_string()));
            }
            settings.tick_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "HYDRA_HOG_RESPAWN_WINDOW_SECS")? {
            settings.respawn_window = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var(&lookup, "HYDRA_HOG_MAX_RESPAWNS")? {
            settings.max_respawns = max;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "HYDRA_HOG_STOP_GRACE_MS")? {
            settings.stop_grace = Duration::from_millis(ms);
        }
        if let Some(mb) = parse_var::<u64, _>(&lookup, "HYDRA_HOG_RAM_CHUNK_MB")? {
            if mb == 0 {
                return Err(HogError::InvalidConfig("HYDRA_HOG_RAM_CHUNK_MB must be positive".to_string()));
            }
            settings.ram_chunk_mb = mb;
        }
        if let Some(raw) = lookup("HYDRA_HOG_RAM_CLAMP_RATIO") {
            settings.ram_clamp_ratio = match raw.trim() {
                "off" | "none" => None,
                value => {
                    let ratio: f64 = value.parse().map_err(|_| {
                        HogError::InvalidConfig(format!("HYDRA_HOG_RAM_CLAMP_RATIO: cannot parse '{}'", value))
                    })?;
                    if !(ratio > 0.0 && ratio <= 1.0) {
                        return Err(HogError::InvalidConfig(format!(
                            "HYDRA_HOG_RAM_CLAMP_RATIO must be in (0, 1], got {}",
                            ratio
                        )));
                    }
                    Some(ratio)
                }
            };
        }
        if let Some(n) = parse_var(&lookup, "HYDRA_HOG_TREND_MIN_SAMPLES")? {
            settings.report.min_trend_samples = n;
        }

        Ok(settings)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> HogResult<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| HogError::InvalidConfig(format!("{}: cannot parse '{}'", key, raw))),
    }
}
