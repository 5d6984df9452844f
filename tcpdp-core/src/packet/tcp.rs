//! TCP flags and option helpers.

use etherparse::TcpHeaderSlice;

/// Size of the TCP header without options.
pub const TCP_BASE_HEADER_LEN: usize = 20;

/// TCP option kinds.
mod options {
    pub const END_OF_LIST: u8 = 0;
    pub const NOP: u8 = 1;
    pub const MSS: u8 = 2;
    pub const MSS_LEN: u8 = 4;
}

/// TCP flags that drive connection tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    pub(crate) fn from_header(tcp: &TcpHeaderSlice<'_>) -> Self {
        Self {
            syn: tcp.syn(),
            ack: tcp.ack(),
            fin: tcp.fin(),
            rst: tcp.rst(),
        }
    }
}

/// Find the Maximum Segment Size option in raw TCP option bytes.
///
/// Walks the option list instead of assuming MSS is the first option, so a
/// stack that puts NOPs or other options first still yields its MSS. Every
/// read is bounds-checked; a truncated or malformed list yields `None`.
pub fn mss_option(raw: &[u8]) -> Option<u16> {
    let mut rest = raw;
    while let Some((&kind, tail)) = rest.split_first() {
        match kind {
            options::END_OF_LIST => return None,
            options::NOP => rest = tail,
            _ => {
                let len = *tail.first()? as usize;
                if len < 2 || len > rest.len() {
                    return None;
                }
                if kind == options::MSS {
                    if len != options::MSS_LEN as usize {
                        return None;
                    }
                    return Some(u16::from_be_bytes([rest[2], rest[3]]));
                }
                rest = &rest[len..];
            }
        }
    }
    None
}
