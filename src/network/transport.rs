//! Probe transport: sends one probe and waits for the single reply it caused
//!
//! [`RawTransport`] owns one raw socket per protocol and one receiver task
//! per socket. Callers register the key of the reply they expect before the
//! probe leaves, so concurrent probes to different hosts, ports or ICMP
//! types never see each other's replies.

use crate::network::packet::{IcmpRequestBuilder, PacketParser, ReplyKey, TcpSegmentBuilder};
use crate::network::socket::{detect_source_ip, RawSocket, RawSockets, RECV_BUFFER_SIZE};
use crate::network::{ProbeKind, ProbeSpec, ReplyInfo};
use async_trait::async_trait;
use log::{debug, error, trace};
use rand::Rng;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// First ephemeral port used as the source of TCP probes
pub const LOCAL_PORT_BASE: u16 = 32768;
/// Number of ephemeral ports cycled through
pub const LOCAL_PORT_SPAN: u32 = 61000 - LOCAL_PORT_BASE as u32;

/// Failure of a single probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to send probe: {0}")]
    Send(#[source] io::Error),

    #[error("failed to receive reply: {0}")]
    Receive(String),

    #[error("failed to build probe: {0}")]
    Build(String),

    #[error("probe transport is closed")]
    TransportClosed,

    #[error("no free local port for a TCP probe")]
    PortsExhausted,
}

impl ProbeError {
    /// Recoverable failures count as "no reply"; the rest abort the host
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProbeError::Send(_) | ProbeError::Receive(_))
    }
}

/// Sends probes and correlates replies
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Send the probe and wait up to `timeout` for its reply
    ///
    /// `Ok(None)` means nothing matching arrived in time.
    async fn send_and_await(
        &self,
        spec: &ProbeSpec,
        timeout: Duration,
    ) -> Result<Option<ReplyInfo>, ProbeError>;
}

struct PendingReply {
    registration: u64,
    sender: oneshot::Sender<ReplyInfo>,
}

struct Shared {
    sockets: RawSockets,
    pending: Mutex<HashMap<ReplyKey, PendingReply>>,
    closed: AtomicBool,
    registrations: AtomicU64,
    icmp_identifier: u16,
    icmp_sequence: AtomicU16,
    port_counter: AtomicU32,
    sources: Mutex<HashMap<Ipv4Addr, Ipv4Addr>>,
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<ReplyKey, PendingReply>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a pending entry for the first vacant key `next_key` yields
    fn register(
        &self,
        mut next_key: impl FnMut() -> ReplyKey,
        exhausted: ProbeError,
    ) -> Result<(PendingGuard<'_>, oneshot::Receiver<ReplyInfo>), ProbeError> {
        let mut pending = self.lock_pending();
        if self.closed.load(Ordering::Acquire) {
            return Err(ProbeError::TransportClosed);
        }

        for _ in 0..LOCAL_PORT_SPAN {
            let key = next_key();
            if let Entry::Vacant(slot) = pending.entry(key) {
                let registration = self.registrations.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = oneshot::channel();
                slot.insert(PendingReply {
                    registration,
                    sender,
                });
                let guard = PendingGuard {
                    shared: self,
                    key,
                    registration,
                };
                return Ok((guard, receiver));
            }
        }

        Err(exhausted)
    }

    /// Register the expected reply and build the packet for `spec`
    fn prepare(&self, spec: &ProbeSpec) -> Result<PreparedProbe<'_>, ProbeError> {
        let target = spec.target;
        match spec.kind {
            ProbeKind::Icmp(probe) => {
                let identifier = self.icmp_identifier;
                let mut sequence = 0;
                let (guard, receiver) = self.register(
                    || {
                        sequence = self.icmp_sequence.fetch_add(1, Ordering::Relaxed);
                        ReplyKey::for_icmp(target, probe, identifier, sequence)
                    },
                    ProbeError::Build("ICMP sequence space exhausted".to_string()),
                )?;
                let packet = IcmpRequestBuilder::new(probe, identifier, sequence).build()?;
                Ok(PreparedProbe {
                    _guard: guard,
                    receiver,
                    packet,
                    socket: &self.sockets.icmp,
                })
            }
            ProbeKind::Tcp { technique, port } => {
                let source_ip = self.source_for(target).map_err(ProbeError::Send)?;
                let mut local_port = 0;
                let (guard, receiver) = self.register(
                    || {
                        local_port = self.next_local_port();
                        ReplyKey::for_tcp(target, port, local_port)
                    },
                    ProbeError::PortsExhausted,
                )?;
                let packet = TcpSegmentBuilder::new(source_ip, target, local_port, port)
                    .flags(technique.tcp_flags())
                    .build()?;
                Ok(PreparedProbe {
                    _guard: guard,
                    receiver,
                    packet,
                    socket: &self.sockets.tcp,
                })
            }
        }
    }

    fn deliver(&self, key: ReplyKey, info: ReplyInfo) {
        let entry = self.lock_pending().remove(&key);
        match entry {
            Some(pending) => {
                let _ = pending.sender.send(info);
            }
            None => trace!("Unmatched reply {:?}", key),
        }
    }

    /// Mark the transport closed and wake every waiter
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.lock_pending().clear();
    }

    fn next_local_port(&self) -> u16 {
        let offset = self.port_counter.fetch_add(1, Ordering::Relaxed) % LOCAL_PORT_SPAN;
        LOCAL_PORT_BASE + offset as u16
    }

    fn source_for(&self, target: Ipv4Addr) -> io::Result<Ipv4Addr> {
        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(source) = sources.get(&target) {
            return Ok(*source);
        }
        let source = detect_source_ip(target)?;
        sources.insert(target, source);
        Ok(source)
    }
}

/// Removes the pending entry when the waiting probe finishes
struct PendingGuard<'a> {
    shared: &'a Shared,
    key: ReplyKey,
    registration: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.shared.lock_pending();
        if let Entry::Occupied(entry) = pending.entry(self.key) {
            if entry.get().registration == self.registration {
                entry.remove();
            }
        }
    }
}

/// A registered probe ready to be sent
struct PreparedProbe<'a> {
    _guard: PendingGuard<'a>,
    receiver: oneshot::Receiver<ReplyInfo>,
    packet: Vec<u8>,
    socket: &'a RawSocket,
}

#[derive(Debug, Clone, Copy)]
enum ReplyChannel {
    Icmp,
    Tcp,
}

/// Raw-socket transport for live networks
pub struct RawTransport {
    shared: Arc<Shared>,
    receivers: Vec<JoinHandle<()>>,
}

impl RawTransport {
    /// Open the raw sockets and start the receiver tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn open() -> crate::Result<Self> {
        let sockets = RawSockets::open()?;
        let mut rng = rand::thread_rng();

        let shared = Arc::new(Shared {
            sockets,
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            registrations: AtomicU64::new(0),
            icmp_identifier: rng.gen(),
            icmp_sequence: AtomicU16::new(rng.gen()),
            port_counter: AtomicU32::new(rng.gen_range(0..LOCAL_PORT_SPAN)),
            sources: Mutex::new(HashMap::new()),
        });

        let receivers = [ReplyChannel::Icmp, ReplyChannel::Tcp]
            .into_iter()
            .map(|channel| tokio::spawn(receive_loop(Arc::clone(&shared), channel)))
            .collect();

        debug!(
            "Raw transport open (ICMP identifier {:#06x})",
            shared.icmp_identifier
        );

        Ok(Self { shared, receivers })
    }
}

impl Drop for RawTransport {
    fn drop(&mut self) {
        for receiver in &self.receivers {
            receiver.abort();
        }
        self.shared.close();
    }
}

#[async_trait]
impl ProbeTransport for RawTransport {
    async fn send_and_await(
        &self,
        spec: &ProbeSpec,
        timeout: Duration,
    ) -> Result<Option<ReplyInfo>, ProbeError> {
        let prepared = self.shared.prepare(spec)?;

        prepared
            .socket
            .send_to(&prepared.packet, spec.target)
            .await
            .map_err(ProbeError::Send)?;
        trace!("Sent {} to {}", spec.kind, spec.target);

        match tokio::time::timeout(timeout, prepared.receiver).await {
            Ok(Ok(info)) => Ok(Some(info)),
            Ok(Err(_)) => Err(ProbeError::TransportClosed),
            Err(_) => Ok(None),
        }
    }
}

async fn receive_loop(shared: Arc<Shared>, channel: ReplyChannel) {
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    let socket = match channel {
        ReplyChannel::Icmp => &shared.sockets.icmp,
        ReplyChannel::Tcp => &shared.sockets.tcp,
    };

    loop {
        match socket.recv(&mut buffer).await {
            Ok(len) => {
                let datagram = &buffer[..len];
                let parsed = match channel {
                    ReplyChannel::Icmp => PacketParser::parse_icmp_reply(datagram),
                    ReplyChannel::Tcp => PacketParser::parse_tcp_reply(datagram),
                };
                if let Some((key, info)) = parsed {
                    shared.deliver(key, info);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("{:?} receiver failed, closing transport: {}", channel, e);
                shared.close();
                return;
            }
        }
    }
}
