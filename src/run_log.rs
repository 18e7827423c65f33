//! Drainable run log.
//!
//! Human-facing, ordered, timestamped lines that the front-end drains each
//! tick. Every entry is mirrored to `tracing`.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tracing::{info, warn};

/// Oldest entries are dropped past this many undrained lines.
const MAX_PENDING: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

#[derive(Debug, Default)]
pub struct RunLog {
    pending: VecDeque<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "hydra_hog::run", "{}", message);
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "hydra_hog::run", "{}", message);
        self.push(LogLevel::Warn, message);
    }

    fn push(&mut self, level: LogLevel, message: String) {
        if self.pending.len() >= MAX_PENDING {
            self.pending.pop_front();
        }
        self.pending.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes every pending entry, oldest first.
    pub fn drain(&mut self) -> Vec<LogEntry> {
        self.pending.drain(..).collect()
    }
}
