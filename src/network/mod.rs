//! Network module for probe crafting, raw transport and reply correlation

pub mod packet;
pub mod probe;
pub mod socket;
pub mod transport;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

pub use probe::{ProbeEngine, ProbeOutcome, TcpReply};
pub use transport::{ProbeError, ProbeTransport, RawTransport};

/// TCP flag bits as they appear in byte 13 of the header
pub mod tcp_flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

/// ICMP query probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IcmpProbe {
    Echo,
    Timestamp,
    Information,
    AddressMask,
}

impl IcmpProbe {
    /// Level 1 probes in the order they are sent
    pub const ALL: [IcmpProbe; 4] = [
        IcmpProbe::Echo,
        IcmpProbe::Timestamp,
        IcmpProbe::Information,
        IcmpProbe::AddressMask,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IcmpProbe::Echo => "icmp-echo",
            IcmpProbe::Timestamp => "icmp-timestamp",
            IcmpProbe::Information => "icmp-information",
            IcmpProbe::AddressMask => "icmp-address-mask",
        }
    }

    /// ICMP type of the request
    pub fn request_type(&self) -> u8 {
        match self {
            IcmpProbe::Echo => 8,
            IcmpProbe::Timestamp => 13,
            IcmpProbe::Information => 15,
            IcmpProbe::AddressMask => 17,
        }
    }

    /// ICMP type of the matching reply
    pub fn reply_type(&self) -> u8 {
        match self {
            IcmpProbe::Echo => 0,
            IcmpProbe::Timestamp => 14,
            IcmpProbe::Information => 16,
            IcmpProbe::AddressMask => 18,
        }
    }

    /// Bytes following the identifier/sequence words
    pub fn body_len(&self) -> usize {
        match self {
            IcmpProbe::Echo => 32,
            // originate, receive and transmit timestamps
            IcmpProbe::Timestamp => 12,
            IcmpProbe::Information => 0,
            IcmpProbe::AddressMask => 4,
        }
    }
}

/// TCP probing techniques
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TcpTechnique {
    /// Half-open SYN probe, port state derived from the reply
    Syn,
    /// Stealth ACK probe
    Ack,
    /// Stealth probe with no flags set
    Null,
    /// Stealth FIN probe
    Fin,
    /// Stealth probe with FIN, PSH and URG set
    Xmas,
}

impl TcpTechnique {
    /// Level 3 techniques in the order they are sent
    pub const STEALTH: [TcpTechnique; 4] = [
        TcpTechnique::Ack,
        TcpTechnique::Null,
        TcpTechnique::Fin,
        TcpTechnique::Xmas,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TcpTechnique::Syn => "SYN",
            TcpTechnique::Ack => "ACK",
            TcpTechnique::Null => "NULL",
            TcpTechnique::Fin => "FIN",
            TcpTechnique::Xmas => "XMAS",
        }
    }

    /// Get TCP flags for this technique
    pub fn tcp_flags(&self) -> u8 {
        match self {
            TcpTechnique::Syn => tcp_flags::SYN,
            TcpTechnique::Ack => tcp_flags::ACK,
            TcpTechnique::Null => 0x00,
            TcpTechnique::Fin => tcp_flags::FIN,
            TcpTechnique::Xmas => tcp_flags::FIN | tcp_flags::PSH | tcp_flags::URG,
        }
    }

    /// Only SYN probes interpret the reply flags
    pub fn is_stealth(&self) -> bool {
        !matches!(self, TcpTechnique::Syn)
    }
}

/// What a single probe sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeKind {
    Icmp(IcmpProbe),
    Tcp { technique: TcpTechnique, port: u16 },
}

impl ProbeKind {
    pub fn syn(port: u16) -> Self {
        ProbeKind::Tcp {
            technique: TcpTechnique::Syn,
            port,
        }
    }

    pub fn stealth(technique: TcpTechnique, port: u16) -> Self {
        ProbeKind::Tcp { technique, port }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Icmp(probe) => write!(f, "{}", probe.name()),
            ProbeKind::Tcp { technique, port } => write!(f, "tcp-{}/{}", technique.name(), port),
        }
    }
}

/// One probe to put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeSpec {
    pub target: Ipv4Addr,
    pub kind: ProbeKind,
}

impl ProbeSpec {
    pub fn new(target: Ipv4Addr, kind: ProbeKind) -> Self {
        Self { target, kind }
    }
}

/// Details of the single reply correlated with a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyInfo {
    Icmp {
        icmp_type: u8,
        ttl: u8,
    },
    Tcp {
        flags: u8,
        window: u16,
        mss: Option<u16>,
        ttl: u8,
    },
}

/// Port state derived from a SYN probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Filtered => write!(f, "filtered"),
        }
    }
}
