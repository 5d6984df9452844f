//! Link-layer framing: locate the IPv4 header inside a captured frame.

use etherparse::{Ethernet2HeaderSlice, SingleVlanHeaderSlice};

use crate::pcap::packet::{
    LINKTYPE_ETHERNET, LINKTYPE_LINUX_SLL, LINKTYPE_NULL, LINKTYPE_RAW, LINKTYPE_RAW_BSD,
    LINKTYPE_RAW_OPENBSD,
};

/// Well-known EtherType values.
mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const VLAN: u16 = 0x8100;
}

/// Linux cooked capture header length.
const SLL_HEADER_LEN: usize = 16;

/// BSD loopback header length (address family in host byte order).
const NULL_HEADER_LEN: usize = 4;

/// AF_INET as written by the BSD loopback header.
const AF_INET: u32 = 2;

/// Return the bytes starting at the IPv4 header, or `None` when the frame
/// does not carry IPv4.
pub fn network_layer(link_type: u16, data: &[u8]) -> Option<&[u8]> {
    match link_type {
        LINKTYPE_ETHERNET => ethernet(data),
        LINKTYPE_RAW | LINKTYPE_RAW_BSD | LINKTYPE_RAW_OPENBSD => {
            (data.first()? >> 4 == 4).then_some(data)
        }
        LINKTYPE_LINUX_SLL => {
            let header = data.get(..SLL_HEADER_LEN)?;
            let protocol = u16::from_be_bytes([header[14], header[15]]);
            (protocol == ethertype::IPV4).then(|| &data[SLL_HEADER_LEN..])
        }
        LINKTYPE_NULL => {
            let header = data.get(..NULL_HEADER_LEN)?;
            let family = [header[0], header[1], header[2], header[3]];
            let is_inet = u32::from_le_bytes(family) == AF_INET
                || u32::from_be_bytes(family) == AF_INET;
            is_inet.then(|| &data[NULL_HEADER_LEN..])
        }
        _ => None,
    }
}

fn ethernet(data: &[u8]) -> Option<&[u8]> {
    let eth = Ethernet2HeaderSlice::from_slice(data).ok()?;
    let mut offset = eth.slice().len();
    let mut ether_type = eth.ether_type().0;

    // A single 802.1Q tag
    if ether_type == ethertype::VLAN {
        let vlan = SingleVlanHeaderSlice::from_slice(&data[offset..]).ok()?;
        offset += vlan.slice().len();
        ether_type = vlan.ether_type().0;
    }

    (ether_type == ethertype::IPV4).then(|| &data[offset..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPV4_START: [u8; 4] = [0x45, 0x00, 0x00, 0x14];

    #[test]
    fn test_ethernet() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&IPV4_START);
        assert_eq!(network_layer(LINKTYPE_ETHERNET, &frame), Some(&IPV4_START[..]));
    }

    #[test]
    fn test_ethernet_vlan() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x81, 0x00, 0x00, 0x64, 0x08, 0x00]);
        frame.extend_from_slice(&IPV4_START);
        assert_eq!(network_layer(LINKTYPE_ETHERNET, &frame), Some(&IPV4_START[..]));
    }

    #[test]
    fn test_linux_sll() {
        let mut frame = vec![0u8; 14];
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&IPV4_START);
        assert_eq!(network_layer(LINKTYPE_LINUX_SLL, &frame), Some(&IPV4_START[..]));
    }

    #[test]
    fn test_null_loopback_both_byte_orders() {
        for family in [[2u8, 0, 0, 0], [0, 0, 0, 2]] {
            let mut frame = family.to_vec();
            frame.extend_from_slice(&IPV4_START);
            assert_eq!(network_layer(LINKTYPE_NULL, &frame), Some(&IPV4_START[..]));
        }
    }

    #[test]
    fn test_raw_requires_ipv4_version() {
        assert_eq!(network_layer(LINKTYPE_RAW, &IPV4_START), Some(&IPV4_START[..]));
        assert_eq!(network_layer(LINKTYPE_RAW, &[0x60, 0, 0, 0]), None);
        assert_eq!(network_layer(LINKTYPE_RAW, &[]), None);
    }

    #[test]
    fn test_unknown_link_type() {
        assert_eq!(network_layer(147, &IPV4_START), None);
    }
}
