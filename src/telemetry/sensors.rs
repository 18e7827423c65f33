//! Temperature sensor access.
//!
//! Raw sensor maps are loosely typed (labels may be blank, duplicated, or
//! report nothing). They are normalized here into a sorted list of
//! `TempReading`s, last write wins per name, so everything downstream works
//! on a stable schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use sysinfo::Components;

use crate::error::HogResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempReading {
    pub sensor: String,
    pub celsius: f64,
}

/// Black-box sensor query. An empty result means "no data", not an error.
pub trait TemperatureSource: Send + Sync {
    fn read_raw(&self) -> HogResult<Vec<(String, f64)>>;

    fn read_temperatures(&self) -> HogResult<Vec<TempReading>> {
        self.read_raw().map(normalize_readings)
    }
}

/// Drops unlabeled and non-finite entries, keeps the last value per name,
/// sorts by name.
pub fn normalize_readings<I>(raw: I) -> Vec<TempReading>
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut by_name: BTreeMap<String, f64> = BTreeMap::new();
    for (name, celsius) in raw {
        let name = name.trim();
        if name.is_empty() || !celsius.is_finite() {
            continue;
        }
        by_name.insert(name.to_string(), celsius);
    }
    by_name
        .into_iter()
        .map(|(sensor, celsius)| TempReading { sensor, celsius })
        .collect()
}

pub fn mean_celsius(readings: &[TempReading]) -> Option<f64> {
    if readings.is_empty() {
        return None;
    }
    Some(readings.iter().map(|r| r.celsius).sum::<f64>() / readings.len() as f64)
}

/// Hardware sensors through `sysinfo`.
#[derive(Debug, Default)]
pub struct SysinfoSensors;

impl SysinfoSensors {
    pub fn new() -> Self {
        Self
    }
}

impl TemperatureSource for SysinfoSensors {
    fn read_raw(&self) -> HogResult<Vec<(String, f64)>> {
        let components = Components::new_with_refreshed_list();
        Ok(components
            .list()
            .iter()
            .filter_map(|c| c.temperature().map(|t| (c.label().to_string(), f64::from(t))))
            .collect())
    }
}

/// A host with no readable sensors.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSensors;

impl TemperatureSource for NoSensors {
    fn read_raw(&self) -> HogResult<Vec<(String, f64)>> {
        Ok(Vec::new())
    }
}
