//! Process control for worker processes.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::WorkerId;
use crate::error::{HogError, HogResult};

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Everything a worker process needs to start burning.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub worker_id: WorkerId,
    pub duty_cycle: f64,
    pub pause_flag: PathBuf,
    pub stop_flag: PathBuf,
}

impl WorkerSpec {
    /// Arguments understood by the `worker` subcommand.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--id".to_string(),
            self.worker_id.to_string(),
            "--duty-cycle".to_string(),
            self.duty_cycle.to_string(),
            "--pause-flag".to_string(),
            self.pause_flag.display().to_string(),
            "--stop-flag".to_string(),
            self.stop_flag.display().to_string(),
        ]
    }
}

/// A running (or exited) worker process.
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;
    fn is_alive(&mut self) -> bool;
    /// Forced termination.
    fn terminate(&mut self) -> HogResult<()>;
    /// Waits up to `timeout` for exit. Returns true if the process is gone.
    fn join(&mut self, timeout: Duration) -> bool;
}

pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, spec: &WorkerSpec) -> HogResult<Box<dyn WorkerProcess>>;
}

/// Spawns workers by re-executing a program (by default the current binary)
/// with its hidden `worker` subcommand.
#[derive(Debug, Clone)]
pub struct ExecSpawner {
    program: PathBuf,
    prefix_args: Vec<String>,
}

impl ExecSpawner {
    pub fn new(program: impl Into<PathBuf>, prefix_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args,
        }
    }

    pub fn current_exe() -> HogResult<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program, vec!["worker".to_string()]))
    }
}

impl ProcessSpawner for ExecSpawner {
    fn spawn(&self, spec: &WorkerSpec) -> HogResult<Box<dyn WorkerProcess>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.prefix_args)
            .args(spec.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        // Own process group: a terminal Ctrl-C reaches only the supervisor,
        // which then stops workers through their flags.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let child = command
            .spawn()
            .map_err(|e| HogError::Spawn {
                worker: spec.worker_id,
                reason: e.to_string(),
            })?;

        debug!(worker = spec.worker_id, pid = child.id(), "worker process started");
        Ok(Box::new(OsWorkerProcess { child, exited: false }))
    }
}

pub struct OsWorkerProcess {
    child: Child,
    exited: bool,
}

impl OsWorkerProcess {
    pub fn from_child(child: Child) -> Self {
        Self { child, exited: false }
    }
}

impl OsWorkerProcess {
    /// The child cannot be polled. It is killed and reaped before being
    /// reported dead so it never outlives its stop flag.
    fn abandon(&mut self, cause: std::io::Error) -> bool {
        warn!(pid = self.child.id(), "cannot poll worker process: {}", cause);
        if let Err(e) = self.terminate() {
            warn!(pid = self.child.id(), "cannot terminate unpollable worker: {}", e);
        }
        self.exited = true;
        false
    }
}

impl WorkerProcess for OsWorkerProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = self.child.id(), %status, "worker process exited");
                self.exited = true;
                false
            }
            Ok(None) => true,
            Err(e) => self.abandon(e),
        }
    }

    fn terminate(&mut self) -> HogResult<()> {
        if self.exited {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => {}
            // Already gone between the liveness check and the kill.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        // Reap so it does not linger as a zombie.
        self.child.wait()?;
        self.exited = true;
        Ok(())
    }

    fn join(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(JOIN_POLL);
        }
    }
}
