//! Progress reporting for discovery runs
//!
//! Observers are advisory: the engine calls them from its workers and its
//! ticker task, and nothing they do feeds back into scheduling.

use crate::discovery::HostResult;
use std::time::Duration;

/// Counts sampled while a run is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub alive: usize,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Get progress percentage
    pub fn percentage(&self) -> f64 {
        if self.total > 0 {
            (self.completed as f64 / self.total as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Estimated time remaining at the current rate
    pub fn eta(&self) -> Option<Duration> {
        if self.completed == 0 || self.elapsed.is_zero() {
            return None;
        }
        let rate = self.completed as f64 / self.elapsed.as_secs_f64();
        let remaining = self.total.saturating_sub(self.completed);
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    /// Render as a single status line
    pub fn render(&self) -> String {
        let eta = match self.eta() {
            Some(eta) => format!(" ETA: {}s", eta.as_secs()),
            None => String::new(),
        };
        format!(
            "{}/{} hosts ({:.1}%), {} alive, {}s elapsed{}",
            self.completed,
            self.total,
            self.percentage(),
            self.alive,
            self.elapsed.as_secs(),
            eta
        )
    }
}

/// Receives progress events from the engine
pub trait ProgressObserver: Send + Sync {
    /// A host finished and its record was stored
    fn host_completed(&self, _result: &HostResult) {}

    /// Periodic sample, at most once per second
    fn progress(&self, _snapshot: &ProgressSnapshot) {}

    /// Every worker has finished
    fn finished(&self, _snapshot: &ProgressSnapshot) {}
}

/// Writes progress samples to the log
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn progress(&self, snapshot: &ProgressSnapshot) {
        log::info!("Progress: {}", snapshot.render());
    }
}

/// Discards every event
pub struct NoProgress;

impl ProgressObserver for NoProgress {}
