//! Raw socket management and operations

use crate::ScanError;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::io::unix::AsyncFd;

/// Largest datagram read from a raw socket
pub const RECV_BUFFER_SIZE: usize = 65535;

/// Non-blocking raw IPv4 socket registered with the tokio reactor
pub struct RawSocket {
    inner: AsyncFd<Socket>,
}

impl RawSocket {
    /// Create a new raw TCP socket
    pub fn new_tcp() -> crate::Result<Self> {
        Self::open(Protocol::TCP)
    }

    /// Create a new raw ICMP socket
    pub fn new_icmp() -> crate::Result<Self> {
        Self::open(Protocol::ICMPV4)
    }

    fn open(protocol: Protocol) -> crate::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::from(libc::SOCK_RAW), Some(protocol))
            .map_err(|e| {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    ScanError::Capability(permission_hint(protocol))
                } else {
                    ScanError::Io(e)
                }
            })?;

        socket.set_nonblocking(true)?;
        let inner = AsyncFd::new(socket)?;

        Ok(Self { inner })
    }

    /// Send a crafted packet; the kernel prepends the IPv4 header
    pub async fn send_to(&self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize> {
        let dest = SockAddr::from(SocketAddrV4::new(target, 0));
        loop {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send_to(packet, &dest)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive one datagram, IPv4 header included
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.inner.readable().await?;
            match guard.try_io(|inner| {
                let mut socket: &Socket = inner.get_ref();
                socket.read(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

/// The pair of raw sockets a discovery run needs
pub struct RawSockets {
    pub tcp: RawSocket,
    pub icmp: RawSocket,
}

impl RawSockets {
    /// Open both sockets, failing with a capability error when not privileged
    pub fn open() -> crate::Result<Self> {
        let icmp = RawSocket::new_icmp()?;
        let tcp = RawSocket::new_tcp()?;
        Ok(Self { tcp, icmp })
    }
}

fn permission_hint(protocol: Protocol) -> String {
    let kind = if protocol == Protocol::TCP { "TCP" } else { "ICMP" };
    // SAFETY: geteuid has no preconditions and cannot fail
    if unsafe { libc::geteuid() } != 0 {
        format!(
            "opening a raw {} socket requires root or CAP_NET_RAW (try sudo)",
            kind
        )
    } else {
        format!("opening a raw {} socket was denied", kind)
    }
}

/// Local IPv4 address the kernel would route to `target` from
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn detect_source_ip(target: Ipv4Addr) -> io::Result<Ipv4Addr> {
    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect(SocketAddr::new(IpAddr::V4(target), 80))?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
        IpAddr::V4(_) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no route to {}", target),
        )),
        IpAddr::V6(_) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "IPv6 source selected for an IPv4 target",
        )),
    }
}
