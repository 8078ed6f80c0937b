//! Error handling for the locus host discovery engine
//!
//! Probe-level failures never reach this type: they are folded into
//! "no reply" by the probe engine or escalate as a [`ScanError::HostScan`]
//! that only ever affects a single host. Everything here is either fatal
//! for the whole run (configuration, capability, export) or a per-host
//! fault carried for logging.

use crate::output::ResultStore;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for discovery runs
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Raw network capability unavailable: {0}")]
    Capability(String),

    #[error("Host scan of {target} aborted: {reason}")]
    HostScan { target: Ipv4Addr, reason: String },

    #[error("Failed to export results to {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: Box<ScanError>,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Wrap a lower-level failure as an export error for `path`
    pub fn export(path: impl Into<PathBuf>, source: ScanError) -> Self {
        ScanError::Export {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

/// Structured failure of a complete run
///
/// Configuration failures happen before any host is scanned and carry no
/// results. Export failures happen after the scan finished, so the
/// in-memory results are handed back to the caller untouched.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: ScanError,
    pub results: Option<ResultStore>,
}

impl RunFailure {
    pub fn before_scan(error: ScanError) -> Self {
        Self { error, results: None }
    }

    pub fn after_scan(error: ScanError, results: ResultStore) -> Self {
        Self {
            error,
            results: Some(results),
        }
    }
}

impl From<ScanError> for RunFailure {
    fn from(error: ScanError) -> Self {
        RunFailure::before_scan(error)
    }
}
