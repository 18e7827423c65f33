//! Respawn Policy
//!
//! Rate-limits hydra respawns per worker id. A worker that survives longer
//! than the window before dying again gets its budget back in full; a worker
//! that burns through `max_respawns` inside the window is retired for the
//! rest of the run, even if later windows elapse.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::worker::WorkerId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RespawnState {
    pub count: u32,
    pub last_respawn: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnDecision {
    pub respawn: bool,
    pub state: RespawnState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RespawnLimits {
    pub window: Duration,
    pub max_respawns: u32,
}

#[derive(Debug, Clone)]
pub struct RespawnPolicy {
    limits: RespawnLimits,
    states: HashMap<WorkerId, RespawnState>,
    exhausted: HashSet<WorkerId>,
    total_respawns: u32,
}

impl RespawnPolicy {
    pub fn new(window: Duration, max_respawns: u32) -> Self {
        Self {
            limits: RespawnLimits { window, max_respawns },
            states: HashMap::new(),
            exhausted: HashSet::new(),
            total_respawns: 0,
        }
    }

    pub fn limits(&self) -> RespawnLimits {
        self.limits
    }

    /// Decides whether worker `id`, observed dead at `now`, may be restarted.
    /// An allowed respawn is counted immediately.
    pub fn should_respawn(&mut self, id: WorkerId, now: Instant) -> RespawnDecision {
        let state = self.states.entry(id).or_default();

        if self.exhausted.contains(&id) {
            return RespawnDecision {
                respawn: false,
                state: *state,
            };
        }

        if let Some(last) = state.last_respawn {
            if now.saturating_duration_since(last) > self.limits.window {
                state.count = 0;
            }
        }

        if state.count < self.limits.max_respawns {
            state.count += 1;
            state.last_respawn = Some(now);
            self.total_respawns += 1;
            RespawnDecision {
                respawn: true,
                state: *state,
            }
        } else {
            self.exhausted.insert(id);
            RespawnDecision {
                respawn: false,
                state: *state,
            }
        }
    }

    pub fn state(&self, id: WorkerId) -> Option<RespawnState> {
        self.states.get(&id).copied()
    }

    pub fn is_exhausted(&self, id: WorkerId) -> bool {
        self.exhausted.contains(&id)
    }

    pub fn total_respawns(&self) -> u32 {
        self.total_respawns
    }
}
