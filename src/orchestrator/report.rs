//! Report Generator
//!
//! Pure function from the final statistics of a run to its diagnostic
//! summary. Same inputs, same report; nothing here reads clocks or sensors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::config::RunConfig;
use crate::telemetry::sensors::TempReading;
use crate::telemetry::TempSample;
use crate::worker::WorkerId;

/// Classification and scoring constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Respawn totals up to this are VOLATILE; above it UNSTABLE.
    pub volatile_max_respawns: u32,
    pub respawn_penalty: f64,
    pub respawn_penalty_cap: f64,
    /// Points lost per missing completion percent on unfinished runs.
    pub incomplete_penalty_per_pct: f64,
    pub early_termination_pct: f64,
    pub success_pct: f64,
    pub high_thermal_delta: f64,
    pub high_thermal_penalty: f64,
    pub minimal_heating_max_delta: f64,
    pub moderate_heating_max_delta: f64,
    /// |trend| below this is a plateau.
    pub plateau_band: f64,
    pub trend_tail_fraction: f64,
    /// Below this many samples no trend is reported.
    pub min_trend_samples: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            volatile_max_respawns: 10,
            respawn_penalty: 15.0,
            respawn_penalty_cap: 60.0,
            incomplete_penalty_per_pct: 0.5,
            early_termination_pct: 50.0,
            success_pct: 95.0,
            high_thermal_delta: 30.0,
            high_thermal_penalty: 10.0,
            minimal_heating_max_delta: 10.0,
            moderate_heating_max_delta: 25.0,
            plateau_band: 1.5,
            trend_tail_fraction: 0.2,
            min_trend_samples: 6,
        }
    }
}

/// Everything the supervisor accumulated over one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub config: RunConfig,
    pub total_respawns: u32,
    pub retired_workers: Vec<WorkerId>,
    pub actual_duration_secs: f64,
    pub baseline: Vec<TempReading>,
    pub peaks: Vec<TempReading>,
    pub samples: Vec<TempSample>,
    pub ram_target_mb: u64,
    pub ram_allocated_mb: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stability {
    Stable,
    Volatile,
    Unstable,
}

impl Stability {
    pub fn classify(respawns: u32, settings: &ReportSettings) -> Self {
        match respawns {
            0 => Self::Stable,
            n if n <= settings.volatile_max_respawns => Self::Volatile,
            _ => Self::Unstable,
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stable => "STABLE",
            Self::Volatile => "VOLATILE",
            Self::Unstable => "UNSTABLE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    EarlyTermination,
    Partial,
    Success,
}

impl Completion {
    pub fn classify(pct: f64, settings: &ReportSettings) -> Self {
        if pct < settings.early_termination_pct {
            Self::EarlyTermination
        } else if pct >= settings.success_pct {
            Self::Success
        } else {
            Self::Partial
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EarlyTermination => "EARLY TERMINATION",
            Self::Partial => "PARTIAL",
            Self::Success => "COMPLETED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatingTier {
    Minimal,
    Moderate,
    Significant,
}

impl HeatingTier {
    pub fn classify(delta: f64, settings: &ReportSettings) -> Self {
        if delta < settings.minimal_heating_max_delta {
            Self::Minimal
        } else if delta < settings.moderate_heating_max_delta {
            Self::Moderate
        } else {
            Self::Significant
        }
    }
}

impl fmt::Display for HeatingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minimal => "MINIMAL HEATING",
            Self::Moderate => "MODERATE HEATING",
            Self::Significant => "SIGNIFICANT HEATING",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThermalTrend {
    Plateaued,
    Rising,
    Declining,
}

impl fmt::Display for ThermalTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plateaued => "PLATEAUED",
            Self::Rising => "RISING (Heat Soak)",
            Self::Declining => "DECLINING",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    /// Last minus first mean reading of the tail slice, °C.
    pub change: f64,
    pub tail_samples: usize,
    pub trend: ThermalTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalSummary {
    pub baseline_avg: f64,
    pub peak_avg: f64,
    pub delta: f64,
    pub heating: HeatingTier,
    pub trend: Option<TrendSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stability: Stability,
    pub total_respawns: u32,
    pub retired_workers: Vec<WorkerId>,
    pub target_duration_secs: u64,
    pub actual_duration_secs: f64,
    pub completion_pct: f64,
    pub completion: Completion,
    pub ram_target_mb: u64,
    pub ram_allocated_mb: u64,
    /// `None` when sensors gave no usable data.
    pub thermal: Option<ThermalSummary>,
    pub score: u32,
}

impl RunReport {
    pub fn generate(stats: &RunStats, settings: &ReportSettings) -> Self {
        let target = stats.config.duration_secs;
        let completion_pct = if target > 0 {
            stats.actual_duration_secs / target as f64 * 100.0
        } else {
            0.0
        };

        let thermal = thermal_summary(stats, settings);
        let score = score(
            stats.total_respawns,
            completion_pct,
            thermal.as_ref().map(|t| t.delta),
            settings,
        );

        Self {
            run_id: stats.run_id,
            stability: Stability::classify(stats.total_respawns, settings),
            total_respawns: stats.total_respawns,
            retired_workers: stats.retired_workers.clone(),
            target_duration_secs: target,
            actual_duration_secs: stats.actual_duration_secs,
            completion_pct,
            completion: Completion::classify(completion_pct, settings),
            ram_target_mb: stats.ram_target_mb,
            ram_allocated_mb: stats.ram_allocated_mb,
            thermal,
            score,
        }
    }

    /// Human-readable diagnostic block.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            "=== FINAL DIAGNOSTIC ===".to_string(),
            format!("OS Stability: {} ({} Respawns)", self.stability, self.total_respawns),
        ];
        if !self.retired_workers.is_empty() {
            let ids: Vec<String> = self.retired_workers.iter().map(|id| id.to_string()).collect();
            lines.push(format!("Retired Workers: {}", ids.join(", ")));
        }
        lines.push(format!(
            "Duration: {:.1}s / {}s ({:.1}%) - {}",
            self.actual_duration_secs, self.target_duration_secs, self.completion_pct, self.completion
        ));
        if self.completion == Completion::EarlyTermination {
            lines.push("WARNING: Test terminated early; results are not representative".to_string());
        }
        if self.ram_target_mb > 0 {
            lines.push(format!(
                "RAM Pressure: {} / {} MB",
                self.ram_allocated_mb, self.ram_target_mb
            ));
        }
        match &self.thermal {
            Some(t) => {
                let trend = match &t.trend {
                    Some(tr) => format!("{:+.1}°C {}", tr.change, tr.trend),
                    None => "Incomplete".to_string(),
                };
                lines.push(format!(
                    "Thermal Delta: {:+.1}°C ({}) | State: {}",
                    t.delta, t.heating, trend
                ));
            }
            None => lines.push("Thermal Data: not available".to_string()),
        }
        lines.push(format!("FINAL SCORE: {}/100", self.score));
        lines.push("========================".to_string());
        lines
    }
}

/// 100, minus capped respawn penalty, minus shortfall on unfinished runs,
/// minus a flat penalty for excessive heating. Floored at 0, truncated.
pub fn score(
    respawns: u32,
    completion_pct: f64,
    thermal_delta: Option<f64>,
    settings: &ReportSettings,
) -> u32 {
    let mut score = 100.0;

    score -= (f64::from(respawns) * settings.respawn_penalty).min(settings.respawn_penalty_cap);

    if completion_pct < settings.success_pct {
        score -= (100.0 - completion_pct).max(0.0) * settings.incomplete_penalty_per_pct;
    }

    if let Some(delta) = thermal_delta {
        if delta > settings.high_thermal_delta {
            score -= settings.high_thermal_penalty;
        }
    }

    if score.is_nan() {
        return 0;
    }
    score.max(0.0) as u32
}

/// Heating is measured over the baseline's sensor set only, so a sensor
/// that appears or vanishes mid-run cannot skew the delta or the trend.
fn thermal_summary(stats: &RunStats, settings: &ReportSettings) -> Option<ThermalSummary> {
    if stats.samples.is_empty() || stats.baseline.is_empty() {
        return None;
    }
    let peaks: HashMap<&str, f64> = stats
        .peaks
        .iter()
        .map(|r| (r.sensor.as_str(), r.celsius))
        .collect();

    let n = stats.baseline.len() as f64;
    let baseline_avg = stats.baseline.iter().map(|r| r.celsius).sum::<f64>() / n;
    let peak_avg = stats
        .baseline
        .iter()
        .map(|r| {
            peaks
                .get(r.sensor.as_str())
                .map_or(r.celsius, |peak| peak.max(r.celsius))
        })
        .sum::<f64>()
        / n;
    // Equal to the mean of per-sensor (peak - baseline).
    let delta = peak_avg - baseline_avg;

    let tracked: Vec<&str> = stats.baseline.iter().map(|r| r.sensor.as_str()).collect();
    let series: Vec<f64> = stats
        .samples
        .iter()
        .filter_map(|s| tracked_mean(s, &tracked))
        .collect();

    Some(ThermalSummary {
        baseline_avg,
        peak_avg,
        delta,
        heating: HeatingTier::classify(delta, settings),
        trend: tail_trend(&series, settings),
    })
}

/// Mean over the tracked sensors; `None` if the sample lacks any of them.
fn tracked_mean(sample: &TempSample, tracked: &[&str]) -> Option<f64> {
    let mut sum = 0.0;
    for name in tracked {
        sum += sample.readings.iter().find(|r| r.sensor == *name)?.celsius;
    }
    Some(sum / tracked.len() as f64)
}

/// Change across the tail slice of the per-sample mean series.
fn tail_trend(series: &[f64], settings: &ReportSettings) -> Option<TrendSummary> {
    if series.len() < settings.min_trend_samples.max(2) {
        return None;
    }

    let wanted = (series.len() as f64 * settings.trend_tail_fraction).ceil() as usize;
    let tail_len = wanted.clamp(2, series.len());
    let tail = &series[series.len() - tail_len..];
    let change = tail[tail.len() - 1] - tail[0];

    let trend = if change.abs() < settings.plateau_band {
        ThermalTrend::Plateaued
    } else if change > 0.0 {
        ThermalTrend::Rising
    } else {
        ThermalTrend::Declining
    };

    Some(TrendSummary {
        change,
        tail_samples: tail_len,
        trend,
    })
}
