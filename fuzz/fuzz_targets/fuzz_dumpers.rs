//! Fuzz target for the protocol decoders.
//!
//! Splits the input into payloads and feeds them through one connection's
//! metadata, alternating directions, so decoder state carries across calls.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tcpdp_core::{Direction, Dumper, HexDumper, MysqlDumper, PgDumper};

fn feed<D: Dumper>(dumper: &D, data: &[u8]) {
    let mut meta = dumper.new_connection_metadata();
    for (i, payload) in data.split(|&b| b == 0xfe).enumerate() {
        let direction = Direction::ALL[i % Direction::ALL.len()];
        let _ = dumper.decode(payload, direction, &mut meta);
    }
}

fuzz_target!(|data: &[u8]| {
    feed(&PgDumper, data);
    feed(&MysqlDumper, data);
    feed(&HexDumper, data);
});
