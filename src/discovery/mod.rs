//! Host Discovery - leveled per-host probing, OS hints and the worker pool
//!
//! A [`HostResult`] is created fully initialised before the first probe of a
//! host and only ever mutated by the single [`host_scan::HostScanner`]
//! invocation that owns it.

pub mod engine;
pub mod host_scan;
pub mod os_detection;
pub mod progress;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

pub use engine::{HostDiscoveryEngine, RunReport};
pub use host_scan::HostScanner;
pub use os_detection::{classify, os_label, OsFamily};
pub use progress::{LogProgress, NoProgress, ProgressObserver, ProgressSnapshot};

/// Liveness of a scanned host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Unknown,
    Alive,
    Dead,
    Error,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostStatus::Unknown => "unknown",
            HostStatus::Alive => "alive",
            HostStatus::Dead => "dead",
            HostStatus::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Per-host discovery record, serialized as one CSV row
///
/// Field order is the column order of the export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    #[serde(rename = "ip")]
    pub address: Ipv4Addr,
    pub status: HostStatus,
    #[serde(with = "discovery_time_format")]
    pub discovery_time: Option<NaiveDateTime>,

    pub icmp_echo: bool,
    pub icmp_timestamp: bool,
    pub icmp_info: bool,
    pub icmp_mask: bool,

    pub tcp_syn_80: bool,
    pub tcp_syn_443: bool,
    pub tcp_syn_0: bool,

    pub tcp_ack: bool,
    pub tcp_null: bool,
    pub tcp_fin: bool,
    pub tcp_xmas: bool,
    pub tcp_window: bool,

    pub window_size: u16,
    pub ttl: u8,
    pub mss: u16,
    pub os_guess: String,
}

impl HostResult {
    /// Fresh record with every probe flag cleared and status `unknown`
    pub fn new(address: Ipv4Addr) -> Self {
        Self {
            address,
            status: HostStatus::Unknown,
            discovery_time: None,
            icmp_echo: false,
            icmp_timestamp: false,
            icmp_info: false,
            icmp_mask: false,
            tcp_syn_80: false,
            tcp_syn_443: false,
            tcp_syn_0: false,
            tcp_ack: false,
            tcp_null: false,
            tcp_fin: false,
            tcp_xmas: false,
            tcp_window: false,
            window_size: 0,
            ttl: 0,
            mss: 0,
            os_guess: String::new(),
        }
    }

    /// Record for a host whose scan never produced a result
    pub fn errored(address: Ipv4Addr) -> Self {
        let mut result = Self::new(address);
        result.mark_error();
        result
    }

    /// Alive is sticky and cannot override an aborted scan
    pub fn mark_alive(&mut self) {
        if self.status != HostStatus::Error {
            self.status = HostStatus::Alive;
        }
    }

    /// Abort: keep probe flags, drop completion time and OS label
    pub fn mark_error(&mut self) {
        self.status = HostStatus::Error;
        self.discovery_time = None;
        self.os_guess.clear();
    }

    /// Classify a live host, stamp the completion time and settle `unknown` as dead
    pub fn finalize(&mut self) {
        if self.status == HostStatus::Error {
            return;
        }

        if self.status == HostStatus::Alive {
            self.os_guess = os_label(self.ttl, self.window_size, self.mss).to_string();
        }

        self.discovery_time = Some(now_seconds());

        if self.status == HostStatus::Unknown {
            self.status = HostStatus::Dead;
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == HostStatus::Alive
    }

    pub fn icmp_detected(&self) -> bool {
        self.icmp_echo || self.icmp_timestamp || self.icmp_info || self.icmp_mask
    }

    pub fn basic_tcp_detected(&self) -> bool {
        self.tcp_syn_80 || self.tcp_syn_443 || self.tcp_syn_0
    }

    /// Stealth replies, including a non-zero window seen by them
    pub fn advanced_tcp_detected(&self) -> bool {
        self.tcp_ack || self.tcp_null || self.tcp_fin || self.tcp_xmas || self.tcp_window
    }

    pub fn any_probe_succeeded(&self) -> bool {
        self.icmp_detected() || self.basic_tcp_detected() || self.advanced_tcp_detected()
    }

    /// Names of the technique groups that saw the host
    pub fn detection_methods(&self) -> Vec<&'static str> {
        let mut methods = Vec::new();
        if self.icmp_detected() {
            methods.push("ICMP");
        }
        if self.basic_tcp_detected() {
            methods.push("TCP-SYN");
        }
        if self.advanced_tcp_detected() {
            methods.push("TCP-Advanced");
        }
        methods
    }
}

fn now_seconds() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// `YYYY-MM-DD HH:MM:SS`, empty when unset
mod discovery_time_format {
    use chrono::NaiveDateTime;
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&time.format(FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        NaiveDateTime::parse_from_str(raw.trim(), FORMAT)
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}
