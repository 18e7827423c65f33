//! Memory Pressure Allocator
//!
//! Grows a retained pool of touched byte chunks toward a target on its own
//! thread, so a slow or failing allocation never stalls the control tick.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{HogError, HogResult};

pub const MB: u64 = 1024 * 1024;

const FILL_BYTE: u8 = b'x';
const IDLE_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureStatus {
    Growing,
    Reached,
    /// An allocation failed; the pool holds whatever was achieved.
    Exhausted,
    Released,
}

impl PressureStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Growing,
            1 => Self::Reached,
            2 => Self::Exhausted,
            _ => Self::Released,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Growing => 0,
            Self::Reached => 1,
            Self::Exhausted => 2,
            Self::Released => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressurePlan {
    pub target_bytes: u64,
    pub chunk_bytes: u64,
    /// Pause between chunks.
    pub pace: Duration,
}

impl PressurePlan {
    pub fn from_mb(target_mb: u64, chunk_mb: u64, pace: Duration) -> Self {
        Self {
            target_bytes: target_mb.saturating_mul(MB),
            chunk_bytes: chunk_mb.max(1).saturating_mul(MB),
            pace,
        }
    }
}

struct Shared {
    active: AtomicBool,
    allocated: AtomicU64,
    status: AtomicU8,
}

impl Shared {
    fn set_status(&self, status: PressureStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }
}

/// Handle to a running allocator. The pool lives on the allocator thread and
/// is dropped there once the handle is released.
pub struct MemoryPressure {
    plan: PressurePlan,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl MemoryPressure {
    pub fn launch(plan: PressurePlan) -> HogResult<Self> {
        let shared = Arc::new(Shared {
            active: AtomicBool::new(true),
            allocated: AtomicU64::new(0),
            status: AtomicU8::new(PressureStatus::Growing.as_u8()),
        });

        let worker_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("hog-ram".to_string())
            .spawn(move || grow_pool(plan, &worker_shared))?;

        Ok(Self {
            plan,
            shared,
            thread: Some(thread),
        })
    }

    pub fn target_mb(&self) -> u64 {
        self.plan.target_bytes / MB
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.shared.allocated.load(Ordering::SeqCst)
    }

    pub fn allocated_mb(&self) -> u64 {
        self.allocated_bytes() / MB
    }

    pub fn status(&self) -> PressureStatus {
        PressureStatus::from_u8(self.shared.status.load(Ordering::SeqCst))
    }

    /// The exhaustion error, if growth stopped short of the target.
    pub fn shortfall(&self) -> Option<HogError> {
        (self.status() == PressureStatus::Exhausted).then(|| HogError::ResourceExhaustion {
            requested_mb: self.target_mb(),
            achieved_mb: self.allocated_mb(),
        })
    }

    /// Stops growth, frees the pool and returns the peak size reached in MB.
    pub fn release(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        let peak = self.allocated_mb();
        self.shared.active.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("RAM allocator thread panicked");
            }
        }
        self.shared.set_status(PressureStatus::Released);
        peak
    }
}

impl Drop for MemoryPressure {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

fn grow_pool(plan: PressurePlan, shared: &Shared) {
    let mut pool: Vec<Vec<u8>> = Vec::new();
    let mut held: u64 = 0;

    while held < plan.target_bytes && shared.active.load(Ordering::SeqCst) {
        let want = plan.chunk_bytes.min(plan.target_bytes - held);
        match allocate_chunk(want) {
            Some(chunk) => {
                held += want;
                pool.push(chunk);
                shared.allocated.store(held, Ordering::SeqCst);
            }
            None => {
                warn!(held_mb = held / MB, "allocation of {} MB failed, holding partial pool", want / MB);
                shared.set_status(PressureStatus::Exhausted);
                break;
            }
        }
        if held < plan.target_bytes && !plan.pace.is_zero() {
            thread::sleep(plan.pace);
        }
    }

    if held >= plan.target_bytes {
        info!(held_mb = held / MB, "RAM pressure target reached");
        shared.set_status(PressureStatus::Reached);
    }

    while shared.active.load(Ordering::SeqCst) {
        thread::sleep(IDLE_POLL);
    }

    debug!(chunks = pool.len(), "releasing RAM pool");
    drop(pool);
    shared.allocated.store(0, Ordering::SeqCst);
}

/// Reserves and touches `bytes`, or returns None if the allocator refuses.
fn allocate_chunk(bytes: u64) -> Option<Vec<u8>> {
    let len = usize::try_from(bytes).ok()?;
    let mut chunk = Vec::new();
    chunk.try_reserve_exact(len).ok()?;
    // Touch every page so the memory is actually committed.
    chunk.resize(len, FILL_BYTE);
    Some(chunk)
}
