mod common;

use common::{cpu_only, FakeSpawner, Harness, ScriptedSensors};
use hydra_hog::memory::PressureStatus;
use hydra_hog::orchestrator::{Completion, HeatingTier, Stability, ThermalTrend};
use hydra_hog::{RunConfig, RunPhase};

#[test]
fn test_pause_time_is_excluded_from_elapsed() {
    let mut h = Harness::new();
    assert!(h.hog.start(cpu_only(2, 30, true)));

    h.tick_after(5.0);
    assert!(h.hog.pause());
    h.tick_after(20.0);
    assert_eq!(h.hog.phase(), RunPhase::Paused);
    assert_eq!(h.hog.stats().effective_elapsed_secs, 5.0);

    assert!(h.hog.resume());
    h.tick_after(10.0);
    assert_eq!(h.hog.stats().effective_elapsed_secs, 15.0);
    assert_eq!(h.hog.phase(), RunPhase::Running);

    // 25s of wall time since resume would have ended an unpaused run long ago.
    h.tick_after(15.0);
    assert_eq!(h.hog.phase(), RunPhase::Idle);
    let report = h.hog.last_report().expect("report after expiry");
    assert_eq!(report.actual_duration_secs, 30.0);
    assert_eq!(report.completion, Completion::Success);
}

#[test]
fn test_paused_ticks_do_nothing() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(1, 60, true));
    h.tick_after(1.0);
    h.hog.pause();

    let reads = h.sensors.reads();
    h.spawner.kill(0);
    for _ in 0..3 {
        h.tick_after(1.0);
    }
    assert_eq!(h.sensors.reads(), reads);
    // The dead worker is only noticed once ticking resumes.
    assert_eq!(h.spawner.spawn_count(), 1);

    h.hog.resume();
    h.tick_after(1.0);
    assert_eq!(h.spawner.spawn_count(), 2);
}

#[test]
fn test_pause_flag_reaches_workers() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(2, 60, true));
    assert!(!h.spawner.pause_flag_set());

    h.hog.toggle_pause();
    assert!(h.spawner.pause_flag_set());

    h.hog.toggle_pause();
    assert!(!h.spawner.pause_flag_set());
    assert_eq!(h.hog.phase(), RunPhase::Running);
}

#[test]
fn test_without_hydra_dead_workers_stay_dead() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(4, 10, false));
    h.spawner.kill_all();
    h.tick_after(1.0);

    let stats = h.hog.stats();
    assert_eq!(stats.live_workers, 0);
    assert_eq!(stats.phase, RunPhase::Running);
    assert_eq!(h.spawner.spawn_count(), 4);

    let log = h.log_messages();
    for id in 0..4 {
        assert!(log.contains(&format!("Worker {} terminated.", id)));
    }

    h.tick_after(9.0);
    let report = h.hog.last_report().unwrap();
    assert_eq!(report.total_respawns, 0);
    assert_eq!(report.stability, Stability::Stable);
    assert_eq!(report.retired_workers, vec![0, 1, 2, 3]);
}

#[test]
fn test_hydra_respawn_budget_is_capped() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(1, 120, true));

    for _ in 0..6 {
        assert!(h.spawner.kill(0));
        h.tick_after(1.0);
    }

    // First spawn plus five respawns; the sixth death retires the id.
    assert_eq!(h.spawner.spawn_count_for(0), 6);
    assert_eq!(h.hog.stats().live_workers, 0);
    assert_eq!(h.hog.stats().total_respawns, 5);

    let log = h.log_messages();
    assert_eq!(
        log.iter().filter(|m| m.starts_with("Hydra: Respawning Worker 0")).count(),
        5
    );
    assert!(log.iter().any(|m| m.contains("exhausted its respawn budget")));

    // Long after the window: still retired.
    h.tick_after(60.0);
    assert_eq!(h.spawner.spawn_count_for(0), 6);

    h.hog.stop();
    let report = h.hog.last_report().unwrap();
    assert_eq!(report.stability, Stability::Volatile);
    assert_eq!(report.retired_workers, vec![0]);
}

#[test]
fn test_respawn_budget_recovers_after_quiet_window() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(1, 120, true));

    h.spawner.kill(0);
    h.tick_after(0.5);
    h.spawner.kill(0);
    h.tick_after(3.0);
    h.spawner.kill(0);
    h.tick_after(15.0);

    assert_eq!(h.spawner.spawn_count_for(0), 4);
    assert_eq!(h.hog.stats().live_workers, 1);
    assert_eq!(h.hog.stats().total_respawns, 3);
}

#[test]
fn test_missing_sensors_degrade_thermal_section() {
    let mut h = Harness::with(FakeSpawner::new(), ScriptedSensors::new());
    h.hog.start(cpu_only(1, 3, true));
    for _ in 0..3 {
        h.tick_after(1.0);
    }

    let log = h.log_messages();
    assert_eq!(
        log.iter()
            .filter(|m| m.starts_with("Temperature sensors not available"))
            .count(),
        1
    );
    let report = h.hog.last_report().unwrap();
    assert!(report.thermal.is_none());
    assert!(report.lines().contains(&"Thermal Data: not available".to_string()));
}

#[test]
fn test_failing_sensors_do_not_end_the_run() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(1, 10, true));
    h.sensors.fail();
    h.tick_after(1.0);
    h.tick_after(1.0);

    assert_eq!(h.hog.phase(), RunPhase::Running);
    assert!(h.hog.stats().current_temps.is_empty());
    let log = h.log_messages();
    assert_eq!(log.iter().filter(|m| m.contains("probe failed")).count(), 1);
}

#[test]
fn test_rising_temperatures_are_reported() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(2, 10, true));

    for i in 1..=10 {
        h.sensors.set_cpu(50.0 + 2.0 * i as f64);
        h.tick_after(1.0);
    }

    let report = h.hog.last_report().expect("run ends at 10s");
    let thermal = report.thermal.as_ref().unwrap();
    assert_eq!(thermal.delta, 20.0);
    assert_eq!(thermal.heating, HeatingTier::Moderate);
    let trend = thermal.trend.as_ref().unwrap();
    assert_eq!(trend.tail_samples, 2);
    assert_eq!(trend.trend, ThermalTrend::Rising);
    assert_eq!(report.score, 100);
}

#[test]
fn test_stop_while_paused_counts_only_running_time() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(2, 60, true));
    h.tick_after(6.0);
    h.hog.pause();
    h.clock.advance_secs(100.0);

    assert!(h.hog.stop());
    assert_eq!(h.hog.phase(), RunPhase::Idle);
    let report = h.hog.last_report().unwrap();
    assert_eq!(report.actual_duration_secs, 6.0);
    assert_eq!(report.completion, Completion::EarlyTermination);
    assert!(report.lines().iter().any(|l| l.starts_with("WARNING")));
}

#[test]
fn test_invalid_transitions_are_ignored() {
    let mut h = Harness::new();
    assert!(!h.hog.pause());
    assert!(!h.hog.resume());
    assert!(!h.hog.stop());
    assert!(!h.hog.toggle_pause());
    h.hog.tick();
    assert_eq!(h.hog.phase(), RunPhase::Idle);

    h.hog.start(cpu_only(1, 60, true));
    assert!(!h.hog.start(cpu_only(8, 60, true)));
    assert!(!h.hog.resume());
    assert_eq!(h.spawner.spawn_count(), 1);
    assert_eq!(h.hog.run_config().map(|c| c.cpu_workers), Some(1));

    h.hog.pause();
    assert!(!h.hog.pause());
    assert_eq!(h.hog.phase(), RunPhase::Paused);
}

#[test]
fn test_stop_forces_stubborn_workers() {
    let mut h = Harness::with(FakeSpawner::stubborn(), ScriptedSensors::with_cpu(40.0));
    h.hog.start(cpu_only(3, 60, true));
    h.hog.stop();

    assert_eq!(h.spawner.forced_terminations(), 3);
    assert_eq!(h.spawner.live_count(), 0);
}

#[test]
fn test_cooperative_workers_exit_without_force() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(3, 60, true));
    h.hog.stop();

    assert_eq!(h.spawner.forced_terminations(), 0);
    assert_eq!(h.spawner.live_count(), 0);
}

#[test]
fn test_spawn_failure_retires_worker_and_run_continues() {
    let spawner = FakeSpawner::new();
    spawner.fail_spawns_for(1);
    let mut h = Harness::with(spawner, ScriptedSensors::with_cpu(45.0));

    assert!(h.hog.start(cpu_only(3, 5, true)));
    assert_eq!(h.hog.stats().live_workers, 2);
    assert!(h
        .log_messages()
        .iter()
        .any(|m| m.starts_with("Failed to spawn worker 1")));

    h.tick_after(5.0);
    assert_eq!(h.hog.last_report().unwrap().retired_workers, vec![1]);
}

#[test]
fn test_new_run_discards_previous_report() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(1, 2, true));
    h.tick_after(2.0);
    let first = h.hog.last_report().unwrap().run_id;

    h.hog.start(cpu_only(1, 2, true));
    assert!(h.hog.last_report().is_none());
    h.tick_after(2.0);
    assert_ne!(h.hog.last_report().unwrap().run_id, first);
}

#[test]
fn test_log_records_start_and_report() {
    let mut h = Harness::new();
    h.hog.start(cpu_only(2, 1, false));
    h.tick_after(1.0);

    let log = h.log_messages();
    assert!(log[0].starts_with("Design Note"));
    assert!(log.iter().any(|m| m.starts_with("Test Start: 2 Workers | Hydra: false")));
    assert!(log.contains(&"=== FINAL DIAGNOSTIC ===".to_string()));
    assert!(log.iter().any(|m| m.starts_with("FINAL SCORE: ")));
    assert!(h.hog.drain_log().is_empty());
}

#[test]
fn test_stats_while_idle() {
    let h = Harness::new();
    let stats = h.hog.stats();
    assert_eq!(stats.phase, RunPhase::Idle);
    assert_eq!(stats.live_workers, 0);
    assert_eq!(stats.target_duration_secs, None);
    assert_eq!(stats.cpu_percent, 12.0);
    assert_eq!(stats.current_temps.len(), 1);
}

#[test]
fn test_ram_advisory_for_oversized_request() {
    let mut h = Harness::new();
    // 15 GB of a 16 GB host. Growth will stop well short of it on a test box,
    // so stop right away.
    let cfg = RunConfig::new(1, 15_000, 60, 0.5, true).unwrap();
    h.hog.start(cfg);
    h.hog.stop();

    let log = h.log_messages();
    assert!(log.iter().any(|m| m.starts_with("CRITICAL: Requesting 15000 MB")));
    let report = h.hog.last_report().unwrap();
    assert_eq!(report.ram_target_mb, 15_000);
    assert!(report.ram_allocated_mb <= 15_000);
}

#[test]
fn test_small_ram_target_is_reached() {
    let mut h = Harness::new();
    let cfg = RunConfig::new(1, 4, 60, 0.5, true).unwrap();
    h.hog.start(cfg);

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while h.hog.stats().ram_status != Some(PressureStatus::Reached) {
        assert!(std::time::Instant::now() < deadline, "RAM target never reached");
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    assert_eq!(h.hog.stats().ram_allocated_mb, 4);
    h.tick_after(1.0);
    assert!(h
        .log_messages()
        .iter()
        .any(|m| m.starts_with("RAM target reached")));

    h.hog.stop();
    assert_eq!(h.hog.last_report().unwrap().ram_allocated_mb, 4);
}
