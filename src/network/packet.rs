//! Packet crafting and reply parsing
//!
//! Probes are built without an IPv4 header: the kernel prepends it when the
//! raw socket sends. Replies arrive with the IPv4 header attached, which is
//! where the TTL used for fingerprinting comes from.

use crate::network::transport::ProbeError;
use crate::network::{IcmpProbe, ReplyInfo};
use chrono::Timelike;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpType, MutableIcmpPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::{MutableTcpPacket, TcpOptionNumbers, TcpPacket};
use pnet::packet::{MutablePacket, Packet};
use rand::Rng;
use std::net::Ipv4Addr;

pub const ICMP_HEADER_LEN: usize = 8;
pub const TCP_HEADER_LEN: usize = 20;
const IPV4_MIN_HEADER_LEN: usize = 20;
/// Advertised window of crafted TCP probes
pub const PROBE_WINDOW: u16 = 1024;

/// Key used to match a reply with the probe that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKey {
    Icmp {
        source: Ipv4Addr,
        reply_type: u8,
        identifier: u16,
        sequence: u16,
    },
    Tcp {
        source: Ipv4Addr,
        source_port: u16,
        dest_port: u16,
    },
}

impl ReplyKey {
    /// Key of the reply expected for an ICMP query
    pub fn for_icmp(target: Ipv4Addr, probe: IcmpProbe, identifier: u16, sequence: u16) -> Self {
        ReplyKey::Icmp {
            source: target,
            reply_type: probe.reply_type(),
            identifier,
            sequence,
        }
    }

    /// Key of the reply expected for a TCP probe sent from `local_port`
    pub fn for_tcp(target: Ipv4Addr, port: u16, local_port: u16) -> Self {
        ReplyKey::Tcp {
            source: target,
            source_port: port,
            dest_port: local_port,
        }
    }
}

/// ICMP query builder for the four level 1 request types
pub struct IcmpRequestBuilder {
    probe: IcmpProbe,
    identifier: u16,
    sequence: u16,
}

impl IcmpRequestBuilder {
    pub fn new(probe: IcmpProbe, identifier: u16, sequence: u16) -> Self {
        Self {
            probe,
            identifier,
            sequence,
        }
    }

    /// Build the ICMP message (header and body, no IP header)
    pub fn build(&self) -> Result<Vec<u8>, ProbeError> {
        let mut buffer = vec![0u8; ICMP_HEADER_LEN + self.probe.body_len()];

        {
            let mut icmp = MutableIcmpPacket::new(&mut buffer)
                .ok_or_else(|| ProbeError::Build("ICMP buffer too small".to_string()))?;
            icmp.set_icmp_type(IcmpType(self.probe.request_type()));
            icmp.set_icmp_code(IcmpCode(0));
            icmp.set_checksum(0);

            // pnet's ICMP view ends after the checksum; identifier and
            // sequence are the first four payload bytes for every query type
            let payload = icmp.payload_mut();
            payload[0..2].copy_from_slice(&self.identifier.to_be_bytes());
            payload[2..4].copy_from_slice(&self.sequence.to_be_bytes());

            match self.probe {
                IcmpProbe::Echo => {
                    for (i, byte) in payload[4..].iter_mut().enumerate() {
                        *byte = 0x10u8.wrapping_add(i as u8);
                    }
                }
                IcmpProbe::Timestamp => {
                    payload[4..8].copy_from_slice(&originate_timestamp().to_be_bytes());
                }
                IcmpProbe::Information | IcmpProbe::AddressMask => {}
            }

            let checksum = pnet::packet::icmp::checksum(&icmp.to_immutable());
            icmp.set_checksum(checksum);
        }

        Ok(buffer)
    }
}

/// Milliseconds since midnight UTC, as ICMP timestamps expect
fn originate_timestamp() -> u32 {
    let now = chrono::Utc::now();
    now.num_seconds_from_midnight() * 1000 + now.timestamp_subsec_millis().min(999)
}

/// TCP segment builder for crafted probes
pub struct TcpSegmentBuilder {
    source_ip: Ipv4Addr,
    dest_ip: Ipv4Addr,
    source_port: u16,
    dest_port: u16,
    flags: u8,
    seq_num: u32,
}

impl TcpSegmentBuilder {
    pub fn new(source_ip: Ipv4Addr, dest_ip: Ipv4Addr, source_port: u16, dest_port: u16) -> Self {
        Self {
            source_ip,
            dest_ip,
            source_port,
            dest_port,
            flags: 0,
            seq_num: rand::thread_rng().gen(),
        }
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn seq_num(mut self, seq_num: u32) -> Self {
        self.seq_num = seq_num;
        self
    }

    /// Build the 20-byte TCP header with a pseudo-header checksum
    pub fn build(&self) -> Result<Vec<u8>, ProbeError> {
        let mut buffer = vec![0u8; TCP_HEADER_LEN];

        {
            let mut tcp = MutableTcpPacket::new(&mut buffer)
                .ok_or_else(|| ProbeError::Build("TCP buffer too small".to_string()))?;
            tcp.set_source(self.source_port);
            tcp.set_destination(self.dest_port);
            tcp.set_sequence(self.seq_num);
            tcp.set_acknowledgement(0);
            tcp.set_data_offset(5);
            tcp.set_flags(self.flags.into());
            tcp.set_window(PROBE_WINDOW);
            tcp.set_urgent_ptr(0);

            let checksum =
                pnet::packet::tcp::ipv4_checksum(&tcp.to_immutable(), &self.source_ip, &self.dest_ip);
            tcp.set_checksum(checksum);
        }

        Ok(buffer)
    }
}

/// Packet parser for datagrams read from the raw sockets
pub struct PacketParser;

impl PacketParser {
    /// Parse an ICMP query reply, returning its correlation key
    pub fn parse_icmp_reply(datagram: &[u8]) -> Option<(ReplyKey, ReplyInfo)> {
        let (ip, offset) = Self::ipv4_payload_offset(datagram)?;
        if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
            return None;
        }

        let icmp_bytes = datagram.get(offset..)?;
        if icmp_bytes.len() < ICMP_HEADER_LEN {
            return None;
        }
        let icmp = IcmpPacket::new(icmp_bytes)?;
        let icmp_type = icmp.get_icmp_type().0;

        let identifier = u16::from_be_bytes([icmp_bytes[4], icmp_bytes[5]]);
        let sequence = u16::from_be_bytes([icmp_bytes[6], icmp_bytes[7]]);

        let key = ReplyKey::Icmp {
            source: ip.get_source(),
            reply_type: icmp_type,
            identifier,
            sequence,
        };
        let info = ReplyInfo::Icmp {
            icmp_type,
            ttl: ip.get_ttl(),
        };
        Some((key, info))
    }

    /// Parse a TCP segment, returning its correlation key
    pub fn parse_tcp_reply(datagram: &[u8]) -> Option<(ReplyKey, ReplyInfo)> {
        let (ip, offset) = Self::ipv4_payload_offset(datagram)?;
        if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
            return None;
        }

        let tcp_bytes = datagram.get(offset..)?;
        let tcp = TcpPacket::new(tcp_bytes)?;

        let header_len = tcp.get_data_offset() as usize * 4;
        let mss = if header_len > TCP_HEADER_LEN && tcp_bytes.len() >= header_len {
            tcp.get_options_iter()
                .find(|option| option.get_number() == TcpOptionNumbers::MSS)
                .and_then(|option| {
                    let value = option.payload();
                    (value.len() >= 2).then(|| u16::from_be_bytes([value[0], value[1]]))
                })
        } else {
            None
        };

        let key = ReplyKey::Tcp {
            source: ip.get_source(),
            source_port: tcp.get_source(),
            dest_port: tcp.get_destination(),
        };
        let info = ReplyInfo::Tcp {
            flags: tcp.get_flags() as u8,
            window: tcp.get_window(),
            mss,
            ttl: ip.get_ttl(),
        };
        Some((key, info))
    }

    fn ipv4_payload_offset(datagram: &[u8]) -> Option<(Ipv4Packet<'_>, usize)> {
        let ip = Ipv4Packet::new(datagram)?;
        if ip.get_version() != 4 {
            return None;
        }
        let offset = ip.get_header_length() as usize * 4;
        if offset < IPV4_MIN_HEADER_LEN || offset > datagram.len() {
            return None;
        }
        Some((ip, offset))
    }
}
