//! Fuzz target for the TCP options walk.
//!
//! Fuzz data becomes the options of a SYN in a raw IPv4 frame.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tcpdp_core::pcap::packet::LINKTYPE_RAW;
use tcpdp_core::{RawPacket, TcpSegment};

fuzz_target!(|data: &[u8]| {
    // At most 40 option bytes fit in a TCP header
    if data.len() > 40 {
        return;
    }
    let mut options = data.to_vec();
    options.resize(data.len().div_ceil(4) * 4, 0);
    let tcp_len = 20 + options.len();

    let mut frame = vec![0x45, 0x00];
    frame.extend_from_slice(&((20 + tcp_len) as u16).to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x01, 0x40, 0x00, 64, 6, 0x00, 0x00]);
    frame.extend_from_slice(&[10, 0, 0, 1, 10, 0, 0, 5]);
    frame.extend_from_slice(&[0x9c, 0x40, 0x0c, 0xea]); // 40000 -> 3306
    frame.extend_from_slice(&[0u8; 8]);
    frame.push(((tcp_len / 4) as u8) << 4);
    frame.extend_from_slice(&[0x02, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00]);
    frame.extend_from_slice(&options);

    let packet = RawPacket::from_frame(1, 0, LINKTYPE_RAW, frame);
    let segment = TcpSegment::decode(&packet).expect("well-formed header must decode");
    assert_eq!(segment.header_len, tcp_len);
    assert!(segment.payload.is_empty());
});
