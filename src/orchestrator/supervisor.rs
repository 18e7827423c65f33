//! Run Supervisor
//!
//! Owns the state of one stress run at a time: the worker pool, the pause
//! flag, the run clock, the respawn policy and the thermal history. It has
//! no timer of its own; the caller drives it by invoking `tick()` at a fixed
//! cadence. Every operation is a silent no-op when called in the wrong phase.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, RunClock, SystemClock};
use crate::config::{EngineSettings, RunConfig};
use crate::error::{HogError, HogResult};
use crate::memory::{MemoryPressure, PressurePlan, PressureStatus};
use crate::orchestrator::report::{RunReport, RunStats};
use crate::orchestrator::respawn::RespawnPolicy;
use crate::run_log::{LogEntry, RunLog};
use crate::telemetry::{
    HostProbe, SysinfoProbe, SysinfoSensors, TempReading, TemperatureSource, ThermalHistory,
};
use crate::worker::{ProcessSpawner, SharedFlag, WorkerId, WorkerProcess, WorkerSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
    /// Transient: set while the stop sequence and report run.
    Stopped,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
        })
    }
}

/// Snapshot for the front-end.
#[derive(Debug, Clone, Serialize)]
pub struct HogStats {
    pub phase: RunPhase,
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub live_workers: usize,
    pub effective_elapsed_secs: f64,
    pub target_duration_secs: Option<u64>,
    pub current_temps: Vec<TempReading>,
    pub total_respawns: u32,
    pub ram_allocated_mb: u64,
    /// `None` when the run holds no memory pressure.
    pub ram_status: Option<PressureStatus>,
}

struct WorkerRecord {
    id: WorkerId,
    process: Box<dyn WorkerProcess>,
    stop: SharedFlag,
}

struct ActiveRun {
    id: Uuid,
    config: RunConfig,
    clock: RunClock,
    pause_flag: SharedFlag,
    workers: Vec<WorkerRecord>,
    respawn: RespawnPolicy,
    thermal: ThermalHistory,
    memory: Option<MemoryPressure>,
    ram_target_mb: u64,
    retired: BTreeSet<WorkerId>,
    sensors_degraded: bool,
    memory_logged: Option<PressureStatus>,
}

pub struct Hog {
    settings: EngineSettings,
    spawner: Arc<dyn ProcessSpawner>,
    sensors: Arc<dyn TemperatureSource>,
    host: Arc<dyn HostProbe>,
    clock: Arc<dyn Clock>,
    phase: RunPhase,
    run: Option<ActiveRun>,
    log: RunLog,
    last_report: Option<RunReport>,
}

impl Hog {
    /// Supervisor with sysinfo-backed sensors and host metrics.
    pub fn new(settings: EngineSettings, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            settings,
            spawner,
            sensors: Arc::new(SysinfoSensors::new()),
            host: Arc::new(SysinfoProbe::new()),
            clock: Arc::new(SystemClock),
            phase: RunPhase::Idle,
            run: None,
            log: RunLog::new(),
            last_report: None,
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_sensors(mut self, sensors: Arc<dyn TemperatureSource>) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn with_host_probe(mut self, host: Arc<dyn HostProbe>) -> Self {
        self.host = host;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn run_config(&self) -> Option<&RunConfig> {
        self.run.as_ref().map(|r| &r.config)
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    pub fn drain_log(&mut self) -> Vec<LogEntry> {
        self.log.drain()
    }

    /// Begins a run. Ignored unless idle.
    #[tracing::instrument(skip_all, fields(workers = cfg.cpu_workers, duration = cfg.duration_secs))]
    pub fn start(&mut self, cfg: RunConfig) -> bool {
        if self.phase != RunPhase::Idle {
            self.ignore("start");
            return false;
        }

        self.last_report = None;
        let pause_flag = match SharedFlag::create() {
            Ok(flag) => flag,
            Err(e) => {
                self.log.warn(format!("Cannot start test: {}", e));
                return false;
            }
        };

        self.log.info(
            "Design Note: HydraHog applies user-defined stress limits without internal enforcement. Use responsibly.",
        );

        let ram_target_mb = self.plan_ram_target(cfg.ram_target_mb);

        let baseline = match self.sensors.read_temperatures() {
            Ok(readings) => readings,
            Err(e) => {
                self.log.warn(e.to_string());
                Vec::new()
            }
        };
        let sensors_degraded = baseline.is_empty();
        if sensors_degraded {
            self.log.warn("Temperature sensors not available; thermal analysis disabled until readings appear");
        }

        self.log.info(format!(
            "Test Start: {} Workers | Hydra: {} | Intensity: {:.0}% | RAM: {} MB | Duration: {}s",
            cfg.cpu_workers,
            cfg.hydra,
            cfg.duty_cycle * 100.0,
            ram_target_mb,
            cfg.duration_secs
        ));

        let mut workers = Vec::with_capacity(cfg.cpu_workers as usize);
        let mut retired = BTreeSet::new();
        for id in 0..cfg.cpu_workers {
            match spawn_worker(self.spawner.as_ref(), id, cfg.duty_cycle, &pause_flag) {
                Ok(record) => workers.push(record),
                Err(e) => {
                    self.log.warn(e.to_string());
                    retired.insert(id);
                }
            }
        }

        let memory = if ram_target_mb > 0 {
            let plan = PressurePlan::from_mb(ram_target_mb, self.settings.ram_chunk_mb, self.settings.ram_pace);
            match MemoryPressure::launch(plan) {
                Ok(pressure) => Some(pressure),
                Err(e) => {
                    self.log.warn(format!("RAM allocator failed to start: {}", e));
                    None
                }
            }
        } else {
            None
        };

        self.run = Some(ActiveRun {
            id: Uuid::new_v4(),
            config: cfg,
            clock: RunClock::start(self.clock.now()),
            pause_flag,
            workers,
            respawn: RespawnPolicy::new(self.settings.respawn_window, self.settings.max_respawns),
            thermal: ThermalHistory::with_baseline(baseline),
            memory,
            ram_target_mb,
            retired,
            sensors_degraded,
            memory_logged: None,
        });
        self.phase = RunPhase::Running;
        true
    }

    /// Parks every worker and freezes the run clock. Ignored unless running.
    pub fn pause(&mut self) -> bool {
        if self.phase != RunPhase::Running {
            self.ignore("pause");
            return false;
        }
        let now = self.clock.now();
        let Some(run) = self.run.as_mut() else {
            return false;
        };
        run.pause_flag.set();
        run.clock.pause(now);
        self.phase = RunPhase::Paused;
        self.log.info("Test PAUSED");
        true
    }

    /// Ignored unless paused.
    pub fn resume(&mut self) -> bool {
        if self.phase != RunPhase::Paused {
            self.ignore("resume");
            return false;
        }
        let now = self.clock.now();
        let Some(run) = self.run.as_mut() else {
            return false;
        };
        run.pause_flag.clear();
        let paused_for = run.clock.resume(now).unwrap_or_default();
        self.phase = RunPhase::Running;
        self.log
            .info(format!("Test RESUMED (paused {:.1}s)", paused_for.as_secs_f64()));
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        match self.phase {
            RunPhase::Running => self.pause(),
            RunPhase::Paused => self.resume(),
            _ => false,
        }
    }

    /// One control step: reap and respawn workers, sample telemetry, and stop
    /// once the effective elapsed time reaches the configured duration.
    /// Does nothing while paused or idle.
    pub fn tick(&mut self) {
        if self.phase != RunPhase::Running {
            return;
        }
        let now = self.clock.now();
        let Some(run) = self.run.as_mut() else {
            return;
        };

        reap_workers(run, self.spawner.as_ref(), &mut self.log, now);
        check_memory(run, &mut self.log);
        sample_thermal(run, self.sensors.as_ref(), &mut self.log, now);

        if run.clock.effective_elapsed(now) >= run.config.duration() {
            self.log.info("Target duration reached");
            self.stop();
        }
    }

    /// Ends the run: stop flags first, forced termination after the grace
    /// period, then the report. Ignored unless running or paused.
    #[tracing::instrument(skip_all)]
    pub fn stop(&mut self) -> bool {
        if !matches!(self.phase, RunPhase::Running | RunPhase::Paused) {
            self.ignore("stop");
            return false;
        }
        let Some(mut run) = self.run.take() else {
            self.phase = RunPhase::Idle;
            return false;
        };

        let now = self.clock.now();
        if run.clock.resume(now).is_some() {
            run.pause_flag.clear();
        }
        let actual = run.clock.effective_elapsed(now);
        self.phase = RunPhase::Stopped;

        for worker in &run.workers {
            worker.stop.set();
        }
        let deadline = Instant::now() + self.settings.stop_grace;
        let mut forced = 0usize;
        for worker in run.workers.iter_mut() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if worker.process.join(remaining) {
                continue;
            }
            match worker.process.terminate() {
                Ok(()) => forced += 1,
                Err(e) => self
                    .log
                    .warn(format!("Failed to terminate worker {}: {}", worker.id, e)),
            }
        }
        self.log.info(format!(
            "Stopped {} workers ({} forced after {:.1}s grace)",
            run.workers.len(),
            forced,
            self.settings.stop_grace.as_secs_f64()
        ));

        let ram_allocated_mb = run.memory.take().map(MemoryPressure::release).unwrap_or(0);

        let stats = RunStats {
            run_id: run.id,
            config: run.config.clone(),
            total_respawns: run.respawn.total_respawns(),
            retired_workers: run.retired.iter().copied().collect(),
            actual_duration_secs: actual.as_secs_f64(),
            baseline: run.thermal.baseline().to_vec(),
            peaks: run.thermal.peaks(),
            samples: run.thermal.samples().to_vec(),
            ram_target_mb: run.ram_target_mb,
            ram_allocated_mb,
        };
        let report = RunReport::generate(&stats, &self.settings.report);
        for line in report.lines() {
            self.log.info(line);
        }
        info!(run_id = %run.id, score = report.score, "run finished");

        self.last_report = Some(report);
        self.phase = RunPhase::Idle;
        true
    }

    pub fn stats(&self) -> HogStats {
        let host = self.host.snapshot();
        let now = self.clock.now();
        let current_temps = self.sensors.read_temperatures().unwrap_or_default();

        let (live_workers, elapsed, target, respawns, ram_mb, ram_status) = match &self.run {
            Some(run) => (
                run.workers.len(),
                run.clock.effective_elapsed(now).as_secs_f64(),
                Some(run.config.duration_secs),
                run.respawn.total_respawns(),
                run.memory.as_ref().map(|m| m.allocated_mb()).unwrap_or(0),
                run.memory.as_ref().map(|m| m.status()),
            ),
            None => (0, 0.0, None, 0, 0, None),
        };

        HogStats {
            phase: self.phase,
            cpu_percent: host.cpu_percent,
            ram_percent: host.ram_percent,
            live_workers,
            effective_elapsed_secs: elapsed,
            target_duration_secs: target,
            current_temps,
            total_respawns: respawns,
            ram_allocated_mb: ram_mb,
            ram_status,
        }
    }

    /// Applies the advisory and the optional clamp to a requested RAM target.
    fn plan_ram_target(&mut self, requested_mb: u64) -> u64 {
        if requested_mb == 0 {
            return 0;
        }
        let host = self.host.snapshot();

        if host.total_memory_mb > 0
            && requested_mb as f64 > host.total_memory_mb as f64 * self.settings.ram_advisory_ratio
        {
            self.log.warn(format!(
                "CRITICAL: Requesting {} MB but system has {} MB. This will likely destabilize the OS.",
                requested_mb, host.total_memory_mb
            ));
        }

        match self.settings.ram_clamp_ratio {
            Some(ratio) if host.available_memory_mb > 0 => {
                let cap = (host.available_memory_mb as f64 * ratio) as u64;
                if requested_mb > cap {
                    self.log.warn(format!(
                        "RAM target clamped from {} MB to {} MB ({:.0}% of {} MB available)",
                        requested_mb,
                        cap,
                        ratio * 100.0,
                        host.available_memory_mb
                    ));
                    cap
                } else {
                    requested_mb
                }
            }
            _ => requested_mb,
        }
    }

    fn ignore(&self, op: &'static str) {
        let err = HogError::InvalidTransition {
            op,
            phase: self.phase.to_string(),
        };
        debug!("{}", err);
    }
}

impl Drop for Hog {
    fn drop(&mut self) {
        if self.run.is_some() {
            self.stop();
        }
    }
}

fn spawn_worker(
    spawner: &dyn ProcessSpawner,
    id: WorkerId,
    duty_cycle: f64,
    pause_flag: &SharedFlag,
) -> HogResult<WorkerRecord> {
    let stop = SharedFlag::create().map_err(|e| HogError::Spawn {
        worker: id,
        reason: e.to_string(),
    })?;
    let spec = WorkerSpec {
        worker_id: id,
        duty_cycle,
        pause_flag: pause_flag.path().to_path_buf(),
        stop_flag: stop.path().to_path_buf(),
    };
    let process = spawner.spawn(&spec)?;
    Ok(WorkerRecord { id, process, stop })
}

fn reap_workers(run: &mut ActiveRun, spawner: &dyn ProcessSpawner, log: &mut RunLog, now: Instant) {
    let mut dead = Vec::new();
    let mut idx = 0;
    while idx < run.workers.len() {
        if run.workers[idx].process.is_alive() {
            idx += 1;
        } else {
            dead.push(run.workers.remove(idx));
        }
    }

    for record in dead {
        let id = record.id;
        drop(record);
        log.warn(format!("Worker {} terminated.", id));

        if !run.config.hydra {
            run.retired.insert(id);
            log.info(format!("Worker {} retired (hydra mode off)", id));
            continue;
        }

        let decision = run.respawn.should_respawn(id, now);
        if !decision.respawn {
            run.retired.insert(id);
            log.warn(
                HogError::RespawnBudgetExhausted {
                    worker: id,
                    attempts: decision.state.count,
                }
                .to_string(),
            );
            continue;
        }

        log.info(format!(
            "Hydra: Respawning Worker {}... ({}/{} in window)",
            id,
            decision.state.count,
            run.respawn.limits().max_respawns
        ));
        match spawn_worker(spawner, id, run.config.duty_cycle, &run.pause_flag) {
            Ok(replacement) => run.workers.push(replacement),
            Err(e) => {
                run.retired.insert(id);
                log.warn(e.to_string());
            }
        }
    }
}

fn check_memory(run: &mut ActiveRun, log: &mut RunLog) {
    let Some(memory) = run.memory.as_ref() else {
        return;
    };
    let status = memory.status();
    if run.memory_logged == Some(status) {
        return;
    }
    match status {
        PressureStatus::Reached => {
            log.info(format!("RAM target reached: {} MB held", memory.allocated_mb()));
        }
        PressureStatus::Exhausted => {
            if let Some(err) = memory.shortfall() {
                log.warn(err.to_string());
            }
        }
        PressureStatus::Growing | PressureStatus::Released => return,
    }
    run.memory_logged = Some(status);
}

fn sample_thermal(run: &mut ActiveRun, sensors: &dyn TemperatureSource, log: &mut RunLog, now: Instant) {
    let elapsed = run.clock.effective_elapsed(now).as_secs_f64();
    let problem = match sensors.read_temperatures() {
        Ok(readings) if !readings.is_empty() => {
            run.thermal.record(elapsed, readings);
            if run.sensors_degraded {
                run.sensors_degraded = false;
                log.info("Temperature sensors reporting");
            }
            return;
        }
        Ok(_) => HogError::SensorUnavailable("no readings".to_string()),
        Err(e) => e,
    };
    if !run.sensors_degraded {
        run.sensors_degraded = true;
        log.warn(problem.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::telemetry::{FixedProbe, HostSnapshot, NoSensors};
    use crate::worker::ExecSpawner;

    fn hog_on_host(settings: EngineSettings, total_mb: u64, available_mb: u64) -> Hog {
        Hog::new(settings, Arc::new(ExecSpawner::new("/nonexistent", Vec::new())))
            .with_sensors(Arc::new(NoSensors))
            .with_host_probe(Arc::new(FixedProbe(HostSnapshot {
                total_memory_mb: total_mb,
                available_memory_mb: available_mb,
                ..HostSnapshot::default()
            })))
            .with_clock(Arc::new(ManualClock::new()))
    }

    #[test]
    fn test_ram_target_clamped_to_available_share() {
        let settings = EngineSettings {
            ram_clamp_ratio: Some(0.5),
            ..EngineSettings::default()
        };
        let mut hog = hog_on_host(settings, 16_000, 10_000);
        assert_eq!(hog.plan_ram_target(9_000), 5_000);
        assert_eq!(hog.plan_ram_target(2_000), 2_000);

        let log = hog.drain_log();
        assert_eq!(log.len(), 1);
        assert!(log[0].message.starts_with("RAM target clamped from 9000 MB to 5000 MB"));
    }

    #[test]
    fn test_clamp_disabled_keeps_request() {
        let settings = EngineSettings {
            ram_clamp_ratio: None,
            ..EngineSettings::default()
        };
        let mut hog = hog_on_host(settings, 16_000, 1_000);
        assert_eq!(hog.plan_ram_target(9_000), 9_000);
    }

    #[test]
    fn test_unknown_host_memory_skips_advisory_and_clamp() {
        let mut hog = hog_on_host(EngineSettings::default(), 0, 0);
        assert_eq!(hog.plan_ram_target(64_000), 64_000);
        assert!(hog.drain_log().is_empty());
    }

    #[test]
    fn test_zero_target_means_no_pressure() {
        let mut hog = hog_on_host(EngineSettings::default(), 16_000, 100);
        assert_eq!(hog.plan_ram_target(0), 0);
        assert!(hog.drain_log().is_empty());
    }

    #[test]
    fn test_unspawnable_workers_still_start_run() {
        let mut hog = hog_on_host(EngineSettings::default(), 0, 0);
        let cfg = RunConfig::new(2, 0, 30, 0.5, true).unwrap();
        assert!(hog.start(cfg));
        assert_eq!(hog.stats().live_workers, 0);
        assert!(hog.stop());
        assert_eq!(hog.last_report().map(|r| r.retired_workers.clone()), Some(vec![0, 1]));
    }
}
