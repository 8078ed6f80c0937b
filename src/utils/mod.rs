//! Utility modules for the discovery engine

pub mod file_input;

use crate::config::ScanLevel;
use std::time::Duration;

/// Logging utilities
pub struct Logger;

impl Logger {
    /// Initialize logger with specified level
    pub fn init(level: log::LevelFilter) {
        env_logger::Builder::from_default_env()
            .filter_level(level)
            .format_timestamp_secs()
            .init();
    }

    /// Log run start
    pub fn log_scan_start(hosts: usize, level: ScanLevel, concurrency: usize) {
        log::info!(
            "Starting host discovery of {} hosts at level {} with {} workers",
            hosts,
            level,
            concurrency
        );
    }

    /// Log run completion
    pub fn log_scan_complete(duration: Duration, completed: usize, total: usize, alive: usize) {
        let alive_pct = if completed > 0 {
            alive as f64 / completed as f64 * 100.0
        } else {
            0.0
        };
        log::info!(
            "Discovery completed in {:.2}s - {}/{} hosts scanned, {} alive ({:.1}%)",
            duration.as_secs_f64(),
            completed,
            total,
            alive,
            alive_pct
        );
    }
}
