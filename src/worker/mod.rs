//! Worker Load Generator
//!
//! CPU burners that run as separate OS processes. Each one loops on a
//! duty cycle: busy for `duty_cycle * 100ms` of wall-clock time, then yields
//! for 10ms. A shared pause flag parks every worker at once; a per-worker
//! stop flag ends the loop.

mod flag;
mod process;

pub use flag::SharedFlag;
pub use process::{ExecSpawner, OsWorkerProcess, ProcessSpawner, WorkerProcess, WorkerSpec};

use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Stable across respawns: a replacement inherits the id of the dead worker.
pub type WorkerId = u32;

pub const WORK_CYCLE: Duration = Duration::from_millis(100);
pub const YIELD_INTERVAL: Duration = Duration::from_millis(10);
pub const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Read side of a boolean signal.
pub trait FlagState {
    fn is_set(&self) -> bool;
}

impl FlagState for AtomicBool {
    fn is_set(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

impl FlagState for SharedFlag {
    fn is_set(&self) -> bool {
        SharedFlag::is_set(self)
    }
}

/// Runs until `stop` is set. Never returns early on its own.
pub fn run_load_generator<S, P>(duty_cycle: f64, stop: &S, pause: &P)
where
    S: FlagState + ?Sized,
    P: FlagState + ?Sized,
{
    let busy_for = WORK_CYCLE.mul_f64(duty_cycle.clamp(0.0, 1.0));
    let mut acc: u64 = 0x9E37_79B9_7F4A_7C15;

    while !stop.is_set() {
        if pause.is_set() {
            std::thread::sleep(PAUSE_POLL);
            continue;
        }

        let started = Instant::now();
        while started.elapsed() < busy_for {
            acc = burn(acc);
        }
        black_box(acc);

        std::thread::sleep(YIELD_INTERVAL);
    }
}

#[inline(never)]
fn burn(mut acc: u64) -> u64 {
    for i in 0..512u64 {
        acc = black_box(acc.rotate_left(7) ^ i.wrapping_mul(0x2545_F491_4F6C_DD1D));
        acc = acc.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    }
    acc
}
