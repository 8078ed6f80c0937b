//! Configuration module for discovery runs

use crate::ScanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default per-probe timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2500;

/// Default worker pool size
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Scan depth tier gating which probe levels run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ScanLevel {
    /// ICMP echo, timestamp, information and address-mask requests
    Icmp = 1,
    /// Adds TCP SYN probes against the basic port list
    BasicTcp = 2,
    /// Adds ACK, NULL, FIN and XMAS probes
    AdvancedTcp = 3,
}

impl ScanLevel {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            ScanLevel::Icmp => "Basic ICMP",
            ScanLevel::BasicTcp => "TCP Basic",
            ScanLevel::AdvancedTcp => "Advanced TCP",
        }
    }
}

impl TryFrom<u8> for ScanLevel {
    type Error = ScanError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ScanLevel::Icmp),
            2 => Ok(ScanLevel::BasicTcp),
            3 => Ok(ScanLevel::AdvancedTcp),
            other => Err(ScanError::Config(format!(
                "max_level must be 1, 2 or 3 (got {})",
                other
            ))),
        }
    }
}

impl From<ScanLevel> for u8 {
    fn from(level: ScanLevel) -> Self {
        level.number()
    }
}

impl fmt::Display for ScanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.description())
    }
}

/// Where the list of targets comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    /// Literal addresses, e.g. from the command line or a range expansion
    Addresses(Vec<String>),
    /// A text file with one target per line
    File(PathBuf),
}

/// Main configuration structure for discovery runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Deepest probe level to run
    pub max_level: ScanLevel,

    /// Timeout for each probe in milliseconds
    pub timeout: u64,

    /// Number of hosts scanned concurrently
    pub concurrency: usize,

    /// CSV file the results are exported to
    pub output_path: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_level: ScanLevel::AdvancedTcp,
            timeout: DEFAULT_TIMEOUT_MS,
            concurrency: DEFAULT_CONCURRENCY,
            output_path: default_output_path(),
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deepest level to run
    pub fn with_max_level(mut self, max_level: ScanLevel) -> Self {
        self.max_level = max_level;
        self
    }

    /// Set the per-probe timeout in milliseconds
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the worker pool size
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_output_path(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = output_path.into();
        self
    }

    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.timeout == 0 {
            return Err(ScanError::Config(
                "Probe timeout must be greater than 0".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(ScanError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.output_path.as_os_str().is_empty() {
            return Err(ScanError::Config("Output path cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// `host_discovery_<YYYYmmdd_HHMMSS>.csv` in the working directory
pub fn default_output_path() -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("host_discovery_{}.csv", timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.max_level, ScanLevel::AdvancedTcp);
        assert_eq!(config.timeout_duration(), Duration::from_millis(2500));
        assert_eq!(config.concurrency, 100);

        let name = config.output_path.to_string_lossy().to_string();
        assert!(name.starts_with("host_discovery_"));
        assert!(name.ends_with(".csv"));
        // host_discovery_ + YYYYmmdd_HHMMSS + .csv
        assert_eq!(name.len(), "host_discovery_".len() + 15 + ".csv".len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(ScanLevel::try_from(1).unwrap(), ScanLevel::Icmp);
        assert_eq!(ScanLevel::try_from(3).unwrap(), ScanLevel::AdvancedTcp);
        assert!(matches!(ScanLevel::try_from(0), Err(ScanError::Config(_))));
        assert!(matches!(ScanLevel::try_from(4), Err(ScanError::Config(_))));
        assert!(ScanLevel::Icmp < ScanLevel::BasicTcp);
        assert!(ScanLevel::BasicTcp < ScanLevel::AdvancedTcp);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let config = ScanConfig::new().with_timeout(0);
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));

        let config = ScanConfig::new().with_concurrency(0);
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));

        let config = ScanConfig::new().with_output_path("");
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));
    }

    #[test]
    fn test_level_serializes_as_number() {
        let config = ScanConfig::new()
            .with_max_level(ScanLevel::BasicTcp)
            .with_output_path("out.csv");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"max_level\":2"));

        let parsed: ScanConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_level, ScanLevel::BasicTcp);

        let invalid = json.replace("\"max_level\":2", "\"max_level\":7");
        assert!(serde_json::from_str::<ScanConfig>(&invalid).is_err());
    }
}
