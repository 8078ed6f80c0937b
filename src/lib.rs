//! Locus - multi-technique host discovery
//!
//! Finds live IPv4 hosts with ICMP queries, TCP SYN probes and stealth TCP
//! flag probes, guesses an OS family from reply characteristics and exports
//! one CSV row per host.

pub mod config;
pub mod discovery;
pub mod error;
pub mod network;
pub mod output;
pub mod utils;

// Re-export commonly used types
pub use config::{ScanConfig, ScanLevel, TargetSource};
pub use discovery::{HostDiscoveryEngine, HostResult, HostScanner, HostStatus, RunReport};
pub use error::{RunFailure, ScanError};
pub use network::{ProbeEngine, ProbeError, ProbeTransport, RawTransport};
pub use output::{ResultStore, RunSummary};

pub type Result<T> = std::result::Result<T, ScanError>;
