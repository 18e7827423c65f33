//! In-process fakes for driving the supervisor without real processes,
//! sensors or wall-clock time.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hydra_hog::error::{HogError, HogResult};
use hydra_hog::telemetry::{FixedProbe, HostSnapshot, TemperatureSource};
use hydra_hog::worker::{ProcessSpawner, SharedFlag, WorkerId, WorkerProcess, WorkerSpec};
use hydra_hog::{EngineSettings, Hog, ManualClock, RunConfig};

struct Spawned {
    id: WorkerId,
    alive: Arc<AtomicBool>,
    pause_flag: PathBuf,
}

pub struct FakeProcess {
    alive: Arc<AtomicBool>,
    stop: SharedFlag,
    ignore_stop: bool,
    forced: Arc<AtomicUsize>,
}

impl WorkerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn terminate(&mut self) -> HogResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        self.forced.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn join(&mut self, _timeout: Duration) -> bool {
        if self.stop.is_set() && !self.ignore_stop {
            self.alive.store(false, Ordering::SeqCst);
        }
        !self.alive.load(Ordering::SeqCst)
    }
}

/// Hands out `FakeProcess`es that tests can kill at will.
#[derive(Default)]
pub struct FakeSpawner {
    spawned: Mutex<Vec<Spawned>>,
    failing: Mutex<HashSet<WorkerId>>,
    forced: Arc<AtomicUsize>,
    ignore_stop: AtomicBool,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Workers that keep running after their stop flag is set.
    pub fn stubborn() -> Self {
        let spawner = Self::default();
        spawner.ignore_stop.store(true, Ordering::SeqCst);
        spawner
    }

    pub fn fail_spawns_for(&self, id: WorkerId) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    pub fn spawn_count_for(&self, id: WorkerId) -> usize {
        self.spawned.lock().unwrap().iter().filter(|s| s.id == id).count()
    }

    pub fn forced_terminations(&self) -> usize {
        self.forced.load(Ordering::SeqCst)
    }

    pub fn live_count(&self) -> usize {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.alive.load(Ordering::SeqCst))
            .count()
    }

    /// Kills the live instance of worker `id`, as an external `kill` would.
    pub fn kill(&self, id: WorkerId) -> bool {
        let spawned = self.spawned.lock().unwrap();
        match spawned
            .iter()
            .rev()
            .find(|s| s.id == id && s.alive.load(Ordering::SeqCst))
        {
            Some(s) => {
                s.alive.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn kill_all(&self) {
        for s in self.spawned.lock().unwrap().iter() {
            s.alive.store(false, Ordering::SeqCst);
        }
    }

    /// Pause flag as seen from the worker side.
    pub fn pause_flag_set(&self) -> bool {
        let spawned = self.spawned.lock().unwrap();
        let path = &spawned.last().expect("no worker spawned").pause_flag;
        SharedFlag::open(path).expect("open pause flag").is_set()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, spec: &WorkerSpec) -> HogResult<Box<dyn WorkerProcess>> {
        if self.failing.lock().unwrap().contains(&spec.worker_id) {
            return Err(HogError::Spawn {
                worker: spec.worker_id,
                reason: "refused by test".to_string(),
            });
        }
        let alive = Arc::new(AtomicBool::new(true));
        self.spawned.lock().unwrap().push(Spawned {
            id: spec.worker_id,
            alive: alive.clone(),
            pause_flag: spec.pause_flag.clone(),
        });
        Ok(Box::new(FakeProcess {
            alive,
            stop: SharedFlag::open(&spec.stop_flag)?,
            ignore_stop: self.ignore_stop.load(Ordering::SeqCst),
            forced: self.forced.clone(),
        }))
    }
}

enum SensorMode {
    Readings(Vec<(String, f64)>),
    Failing,
}

/// Sensors whose output the test sets between ticks.
pub struct ScriptedSensors {
    mode: Mutex<SensorMode>,
    reads: AtomicUsize,
}

impl ScriptedSensors {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(SensorMode::Readings(Vec::new())),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_cpu(celsius: f64) -> Self {
        let sensors = Self::new();
        sensors.set_cpu(celsius);
        sensors
    }

    pub fn set_cpu(&self, celsius: f64) {
        *self.mode.lock().unwrap() = SensorMode::Readings(vec![("cpu".to_string(), celsius)]);
    }

    pub fn clear(&self) {
        *self.mode.lock().unwrap() = SensorMode::Readings(Vec::new());
    }

    pub fn fail(&self) {
        *self.mode.lock().unwrap() = SensorMode::Failing;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl TemperatureSource for ScriptedSensors {
    fn read_raw(&self) -> HogResult<Vec<(String, f64)>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match &*self.mode.lock().unwrap() {
            SensorMode::Readings(r) => Ok(r.clone()),
            SensorMode::Failing => Err(HogError::SensorUnavailable("probe failed".to_string())),
        }
    }
}

pub struct Harness {
    pub hog: Hog,
    pub clock: Arc<ManualClock>,
    pub spawner: Arc<FakeSpawner>,
    pub sensors: Arc<ScriptedSensors>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeSpawner::new(), ScriptedSensors::with_cpu(50.0))
    }

    pub fn with(spawner: FakeSpawner, sensors: ScriptedSensors) -> Self {
        let clock = Arc::new(ManualClock::new());
        let spawner = Arc::new(spawner);
        let sensors = Arc::new(sensors);
        let hog = Hog::new(test_settings(), spawner.clone())
            .with_sensors(sensors.clone())
            .with_host_probe(Arc::new(FixedProbe(HostSnapshot {
                cpu_percent: 12.0,
                ram_percent: 40.0,
                total_memory_mb: 16_384,
                available_memory_mb: 8_192,
            })))
            .with_clock(clock.clone());
        Self {
            hog,
            clock,
            spawner,
            sensors,
        }
    }

    /// Advances the clock, then ticks.
    pub fn tick_after(&mut self, secs: f64) {
        self.clock.advance_secs(secs);
        self.hog.tick();
    }

    pub fn log_messages(&mut self) -> Vec<String> {
        self.hog.drain_log().into_iter().map(|e| e.message).collect()
    }
}

pub fn test_settings() -> EngineSettings {
    EngineSettings {
        stop_grace: Duration::from_millis(20),
        ram_clamp_ratio: None,
        ..EngineSettings::default()
    }
}

/// No memory pressure; RAM is covered separately.
pub fn cpu_only(workers: u32, duration_secs: u64, hydra: bool) -> RunConfig {
    RunConfig::new(workers, 0, duration_secs, 0.5, hydra).unwrap()
}
