//! Link/IPv4/TCP decoding of captured frames.
//!
//! [`TcpSegment::decode`] turns a [`RawPacket`] into the handful of fields the
//! stream pipeline needs. Anything that is not IPv4 + TCP decodes to `None`,
//! which the pipeline treats as "not our traffic" rather than an error.

mod link;
mod tcp;

use std::net::SocketAddrV4;

use etherparse::{Ipv4HeaderSlice, TcpHeaderSlice};

use crate::pcap::RawPacket;

pub use link::network_layer;
pub use tcp::{mss_option, TcpFlags, TCP_BASE_HEADER_LEN};

/// IP protocol number for TCP.
pub const IP_PROTO_TCP: u8 = 6;

/// The TCP view of one captured frame.
#[derive(Debug, Clone)]
pub struct TcpSegment<'a> {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    pub flags: TcpFlags,
    /// TCP header length including options.
    pub header_len: usize,
    /// MSS option, when present and well formed.
    pub mss: Option<u16>,
    pub payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    /// Decode a captured frame down to its TCP segment.
    pub fn decode(packet: &'a RawPacket) -> Option<Self> {
        let ip_data = network_layer(packet.link_type, &packet.data)?;
        Self::from_ipv4(ip_data)
    }

    /// Decode starting at the IPv4 header.
    pub fn from_ipv4(data: &'a [u8]) -> Option<Self> {
        let ipv4 = Ipv4HeaderSlice::from_slice(data).ok()?;
        if ipv4.protocol().0 != IP_PROTO_TCP {
            return None;
        }
        // Fragments carry partial TCP headers or none at all
        if ipv4.more_fragments() || ipv4.fragments_offset().value() != 0 {
            return None;
        }

        let header_len = ipv4.slice().len();
        // Trim link-layer padding; a zero total length shows up with segmentation offload
        let total_len = match ipv4.total_len() as usize {
            0 => data.len(),
            n => n.min(data.len()),
        };
        if total_len < header_len {
            return None;
        }
        let tcp_data = &data[header_len..total_len];

        let tcp = TcpHeaderSlice::from_slice(tcp_data).ok()?;
        let tcp_header_len = tcp.slice().len();

        Some(Self {
            src: SocketAddrV4::new(ipv4.source_addr(), tcp.source_port()),
            dst: SocketAddrV4::new(ipv4.destination_addr(), tcp.destination_port()),
            flags: TcpFlags::from_header(&tcp),
            header_len: tcp_header_len,
            mss: mss_option(tcp.options()),
            payload: &tcp_data[tcp_header_len..],
        })
    }
}
