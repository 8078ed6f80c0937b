//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use locus::network::{tcp_flags, ProbeKind, ProbeSpec, ReplyInfo};
use locus::{ProbeError, ProbeTransport};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How the fake network answers one probe
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Answer immediately
    Reply(ReplyInfo),
    /// Stay quiet until the probe times out
    Silent,
    /// Recoverable send failure
    Fail,
    /// Unrecoverable transport failure
    Fault,
}

/// Deterministic [`ProbeTransport`] answering from a script
///
/// Anything not scripted stays silent for the full timeout.
#[derive(Default)]
pub struct ScriptedTransport {
    script: HashMap<(Ipv4Addr, ProbeKind), Behaviour>,
    sent: Mutex<Vec<ProbeSpec>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, target: Ipv4Addr, kind: ProbeKind, info: ReplyInfo) -> Self {
        self.script.insert((target, kind), Behaviour::Reply(info));
        self
    }

    pub fn fail(mut self, target: Ipv4Addr, kind: ProbeKind) -> Self {
        self.script.insert((target, kind), Behaviour::Fail);
        self
    }

    pub fn fault(mut self, target: Ipv4Addr, kind: ProbeKind) -> Self {
        self.script.insert((target, kind), Behaviour::Fault);
        self
    }

    /// Every probe sent so far, in send order
    pub fn sent(&self) -> Vec<ProbeSpec> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, target: Ipv4Addr) -> Vec<ProbeKind> {
        self.sent()
            .into_iter()
            .filter(|spec| spec.target == target)
            .map(|spec| spec.kind)
            .collect()
    }

    /// Highest number of probes that were awaiting a reply at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn send_and_await(
        &self,
        spec: &ProbeSpec,
        timeout: Duration,
    ) -> Result<Option<ReplyInfo>, ProbeError> {
        self.sent.lock().unwrap().push(*spec);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let behaviour = self
            .script
            .get(&(spec.target, spec.kind))
            .copied()
            .unwrap_or(Behaviour::Silent);

        let outcome = match behaviour {
            Behaviour::Reply(info) => {
                tokio::task::yield_now().await;
                Ok(Some(info))
            }
            Behaviour::Silent => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Behaviour::Fail => Err(ProbeError::Send(std::io::Error::new(
                std::io::ErrorKind::Other,
                "network unreachable",
            ))),
            Behaviour::Fault => Err(ProbeError::TransportClosed),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

pub fn icmp_reply(icmp_type: u8, ttl: u8) -> ReplyInfo {
    ReplyInfo::Icmp { icmp_type, ttl }
}

pub fn syn_ack(window: u16, mss: Option<u16>) -> ReplyInfo {
    ReplyInfo::Tcp {
        flags: tcp_flags::SYN | tcp_flags::ACK,
        window,
        mss,
        ttl: 64,
    }
}

pub fn rst(window: u16) -> ReplyInfo {
    ReplyInfo::Tcp {
        flags: tcp_flags::RST,
        window,
        mss: None,
        ttl: 64,
    }
}

/// `10.0.<n / 256>.<n % 256>` for n in 0..count
pub fn addresses(count: usize) -> Vec<Ipv4Addr> {
    (0..count)
        .map(|n| Ipv4Addr::new(10, 0, (n / 256) as u8, (n % 256) as u8))
        .collect()
}
