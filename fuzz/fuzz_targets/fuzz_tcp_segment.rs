//! Fuzz target for frame decoding.
//!
//! The first byte picks the link type; the rest is the frame.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tcpdp_core::pcap::packet::{
    LINKTYPE_ETHERNET, LINKTYPE_LINUX_SLL, LINKTYPE_NULL, LINKTYPE_RAW,
};
use tcpdp_core::{RawPacket, TcpSegment};

const LINK_TYPES: [u16; 4] = [LINKTYPE_NULL, LINKTYPE_ETHERNET, LINKTYPE_RAW, LINKTYPE_LINUX_SLL];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, frame)) = data.split_first() else {
        return;
    };
    let link_type = LINK_TYPES[selector as usize % LINK_TYPES.len()];
    let packet = RawPacket::from_frame(1, 0, link_type, frame.to_vec());

    if let Some(segment) = TcpSegment::decode(&packet) {
        assert!(segment.header_len >= 20);
        assert!(segment.payload.len() <= frame.len());
    }
});
