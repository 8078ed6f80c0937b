//! OS fingerprinting from reply characteristics
//!
//! Rules are checked by category: TTL first, then window size, then MSS.
//! A later category only applies while no earlier one produced a label.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Window sizes typical of Linux/Unix stacks
pub const LINUX_WINDOWS: [u16; 2] = [64240, 65535];
/// Window sizes typical of Windows stacks
///
/// 65535 also appears in [`LINUX_WINDOWS`], which is checked first and wins.
pub const WINDOWS_WINDOWS: [u16; 3] = [8192, 16384, 65535];
pub const LINUX_MSS: [u16; 2] = [1460, 1440];
pub const WINDOWS_MSS: [u16; 2] = [1380, 1400];

/// Operating system family guessed for a live host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    LinuxUnix,
    Windows,
    CiscoNetwork,
}

impl OsFamily {
    pub fn label(&self) -> &'static str {
        match self {
            OsFamily::LinuxUnix => "Linux/Unix",
            OsFamily::Windows => "Windows",
            OsFamily::CiscoNetwork => "Cisco/Network",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// TTL-based family: initial TTLs of 64, 128 and 255 minus hops
pub fn family_from_ttl(ttl: u8) -> Option<OsFamily> {
    match ttl {
        0 => None,
        1..=64 => Some(OsFamily::LinuxUnix),
        65..=128 => Some(OsFamily::Windows),
        _ => Some(OsFamily::CiscoNetwork),
    }
}

pub fn family_from_window(window: u16) -> Option<OsFamily> {
    if LINUX_WINDOWS.contains(&window) {
        Some(OsFamily::LinuxUnix)
    } else if WINDOWS_WINDOWS.contains(&window) {
        Some(OsFamily::Windows)
    } else {
        None
    }
}

pub fn family_from_mss(mss: u16) -> Option<OsFamily> {
    if LINUX_MSS.contains(&mss) {
        Some(OsFamily::LinuxUnix)
    } else if WINDOWS_MSS.contains(&mss) {
        Some(OsFamily::Windows)
    } else {
        None
    }
}

/// Classify a host from its TTL, TCP window and MSS
pub fn classify(ttl: u8, window: u16, mss: u16) -> Option<OsFamily> {
    family_from_ttl(ttl)
        .or_else(|| family_from_window(window))
        .or_else(|| family_from_mss(mss))
}

/// Label form of [`classify`]; empty when nothing matched
pub fn os_label(ttl: u8, window: u16, mss: u16) -> &'static str {
    classify(ttl, window, mss)
        .map(|family| family.label())
        .unwrap_or("")
}
