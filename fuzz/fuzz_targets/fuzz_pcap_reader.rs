//! Fuzz target for PCAP/PCAPNG parsing.
//!
//! Malformed headers and records must surface as errors, never panics.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tcpdp_core::PcapReader;

fuzz_target!(|data: &[u8]| {
    let Ok(mut reader) = PcapReader::from_bytes(data) else {
        return;
    };
    // Keeps each run short on inputs with many tiny records
    for _ in 0..10_000 {
        match reader.next_packet() {
            Ok(Some(packet)) => {
                let _ = tcpdp_core::TcpSegment::decode(&packet);
            }
            Ok(None) | Err(_) => break,
        }
    }
});
