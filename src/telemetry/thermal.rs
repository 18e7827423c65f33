use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::sensors::TempReading;

/// One telemetry sample, stamped with effective (pause-free) run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempSample {
    pub elapsed_secs: f64,
    pub readings: Vec<TempReading>,
}

/// Baseline, per-sensor peaks and the sample series of one run.
#[derive(Debug, Clone, Default)]
pub struct ThermalHistory {
    baseline: Vec<TempReading>,
    peaks: BTreeMap<String, f64>,
    samples: Vec<TempSample>,
}

impl ThermalHistory {
    /// Peaks start out equal to the baseline.
    pub fn with_baseline(baseline: Vec<TempReading>) -> Self {
        let peaks = baseline
            .iter()
            .map(|r| (r.sensor.clone(), r.celsius))
            .collect();
        Self {
            baseline,
            peaks,
            samples: Vec::new(),
        }
    }

    /// Appends a sample and raises peaks. Empty readings are not a sample.
    pub fn record(&mut self, elapsed_secs: f64, readings: Vec<TempReading>) -> bool {
        if readings.is_empty() {
            return false;
        }
        for r in &readings {
            self.peaks
                .entry(r.sensor.clone())
                .and_modify(|peak| *peak = peak.max(r.celsius))
                .or_insert(r.celsius);
        }
        self.samples.push(TempSample {
            elapsed_secs,
            readings,
        });
        true
    }

    pub fn baseline(&self) -> &[TempReading] {
        &self.baseline
    }

    pub fn peaks(&self) -> Vec<TempReading> {
        self.peaks
            .iter()
            .map(|(sensor, celsius)| TempReading {
                sensor: sensor.clone(),
                celsius: *celsius,
            })
            .collect()
    }

    pub fn samples(&self) -> &[TempSample] {
        &self.samples
    }
}
