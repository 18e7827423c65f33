//! Time sources and pause-aware run timing.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time source. Injected so runs can be driven deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}

/// Wall-clock bookkeeping for one run.
///
/// `effective = (now - start) - accumulated_pause - (now - pause_start if paused)`,
/// which stays frozen while paused and never goes backwards while running.
#[derive(Debug, Clone)]
pub struct RunClock {
    start: Instant,
    pause_start: Option<Instant>,
    accumulated_pause: Duration,
}

impl RunClock {
    pub fn start(now: Instant) -> Self {
        Self {
            start: now,
            pause_start: None,
            accumulated_pause: Duration::ZERO,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pause_start.is_some()
    }

    /// Returns false if already paused.
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.pause_start.is_some() {
            return false;
        }
        self.pause_start = Some(now);
        true
    }

    /// Folds the open pause interval into the accumulated total and returns it.
    pub fn resume(&mut self, now: Instant) -> Option<Duration> {
        let started = self.pause_start.take()?;
        let paused_for = now.saturating_duration_since(started);
        self.accumulated_pause += paused_for;
        Some(paused_for)
    }

    pub fn accumulated_pause(&self) -> Duration {
        self.accumulated_pause
    }

    pub fn wall_elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }

    pub fn effective_elapsed(&self, now: Instant) -> Duration {
        let open_pause = self
            .pause_start
            .map(|p| now.saturating_duration_since(p))
            .unwrap_or(Duration::ZERO);
        self.wall_elapsed(now)
            .saturating_sub(self.accumulated_pause)
            .saturating_sub(open_pause)
    }
}
