//! Host resource probe (CPU and RAM usage).

use serde::Serialize;
use std::sync::Mutex;
use sysinfo::System;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HostSnapshot {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub total_memory_mb: u64,
    pub available_memory_mb: u64,
}

pub trait HostProbe: Send + Sync {
    fn snapshot(&self) -> HostSnapshot;
}

/// Host metrics through `sysinfo`. CPU usage is a delta between refreshes,
/// so the first snapshot after construction may read 0%.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self {
            system: Mutex::new(sys),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SysinfoProbe {
    fn snapshot(&self) -> HostSnapshot {
        let mut sys = self.system.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let total_mem = sys.total_memory();
        let used_mem = sys.used_memory();
        let ram_percent = if total_mem > 0 {
            (used_mem as f64 / total_mem as f64) * 100.0
        } else {
            0.0
        };

        HostSnapshot {
            cpu_percent: f64::from(sys.global_cpu_usage()),
            ram_percent,
            total_memory_mb: total_mem / BYTES_PER_MB,
            available_memory_mb: sys.available_memory() / BYTES_PER_MB,
        }
    }
}

/// Fixed numbers, for hosts where probing is unwanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedProbe(pub HostSnapshot);

impl HostProbe for FixedProbe {
    fn snapshot(&self) -> HostSnapshot {
        self.0
    }
}
