//! Probe engine: one probe, one interpreted outcome

use crate::network::transport::{ProbeError, ProbeTransport};
use crate::network::{tcp_flags, PortState, ProbeKind, ProbeSpec, ReplyInfo};
use log::debug;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// TCP reply fields the discovery levels care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpReply {
    pub flags: u8,
    pub window: u16,
    pub mss: Option<u16>,
    pub ttl: u8,
}

impl TcpReply {
    /// Both SYN and ACK set
    pub fn is_syn_ack(&self) -> bool {
        (self.flags & tcp_flags::SYN) != 0 && (self.flags & tcp_flags::ACK) != 0
    }

    pub fn is_rst(&self) -> bool {
        (self.flags & tcp_flags::RST) != 0
    }

    /// Port state as seen by a SYN probe
    pub fn port_state(&self) -> PortState {
        if self.is_syn_ack() {
            PortState::Open
        } else if self.is_rst() {
            PortState::Closed
        } else {
            PortState::Filtered
        }
    }
}

/// Result of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    NoReply,
    Icmp { ttl: u8 },
    Tcp(TcpReply),
}

impl ProbeOutcome {
    pub fn replied(&self) -> bool {
        !matches!(self, ProbeOutcome::NoReply)
    }

    pub fn tcp(&self) -> Option<&TcpReply> {
        match self {
            ProbeOutcome::Tcp(reply) => Some(reply),
            _ => None,
        }
    }

    /// SYN-probe view of the outcome; silence means filtered
    pub fn port_state(&self) -> PortState {
        self.tcp()
            .map(TcpReply::port_state)
            .unwrap_or(PortState::Filtered)
    }
}

/// Sends single probes over a shared transport
pub struct ProbeEngine<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: ?Sized> Clone for ProbeEngine<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: ProbeTransport + ?Sized> ProbeEngine<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Send one probe and wait at most `timeout` for its reply
    ///
    /// Send or receive failures are logged and reported as [`ProbeOutcome::NoReply`].
    /// Only failures that make the transport unusable are returned.
    pub async fn probe(
        &self,
        target: Ipv4Addr,
        kind: ProbeKind,
        timeout: Duration,
    ) -> Result<ProbeOutcome, ProbeError> {
        let spec = ProbeSpec::new(target, kind);

        let reply = match self.transport.send_and_await(&spec, timeout).await {
            Ok(reply) => reply,
            Err(e) if e.is_recoverable() => {
                debug!("{} probe to {} failed: {}", kind, target, e);
                return Ok(ProbeOutcome::NoReply);
            }
            Err(e) => return Err(e),
        };

        Ok(match (kind, reply) {
            (_, None) => ProbeOutcome::NoReply,
            (ProbeKind::Icmp(_), Some(ReplyInfo::Icmp { ttl, .. })) => ProbeOutcome::Icmp { ttl },
            (
                ProbeKind::Tcp { .. },
                Some(ReplyInfo::Tcp {
                    flags,
                    window,
                    mss,
                    ttl,
                }),
            ) => ProbeOutcome::Tcp(TcpReply {
                flags,
                window,
                mss,
                ttl,
            }),
            (kind, Some(other)) => {
                debug!("Ignoring {:?} correlated with {} probe", other, kind);
                ProbeOutcome::NoReply
            }
        })
    }
}
