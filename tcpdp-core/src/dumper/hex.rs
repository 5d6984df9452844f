//! Generic hex dumper.

use std::fmt::Write;

use super::{ConnectionMetadata, DumpValue, Dumper};
use crate::stream::Direction;

/// Logs every payload as a canonical hex dump under `bytes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexDumper;

impl Dumper for HexDumper {
    type State = ();

    fn name(&self) -> &'static str {
        "hex"
    }

    fn decode(
        &self,
        payload: &[u8],
        _direction: Direction,
        _meta: &mut ConnectionMetadata<()>,
    ) -> Vec<DumpValue> {
        if payload.is_empty() {
            return Vec::new();
        }
        vec![DumpValue::new("bytes", hexdump(payload))]
    }
}

/// Offset, 16 hex bytes split in two groups of eight, ASCII gutter.
pub fn hexdump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(16) * 79);
    for (line, chunk) in data.chunks(16).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:08x}  ", line * 16);
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                }
                None => out.push_str("   "),
            }
            if i == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('|');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump_full_line() {
        assert_eq!(
            hexdump(b"Go is an open so"),
            "00000000  47 6f 20 69 73 20 61 6e  20 6f 70 65 6e 20 73 6f  |Go is an open so|"
        );
    }

    #[test]
    fn test_hexdump_partial_line() {
        let expected = format!("00000000  68 65 6c 6c 6f{}|hello|", " ".repeat(36));
        assert_eq!(hexdump(b"hello"), expected);
    }

    #[test]
    fn test_hexdump_second_line_and_nonprintable() {
        let mut data = vec![b'a'; 16];
        data.extend_from_slice(&[0x00, 0x0a]);
        let dump = hexdump(&data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("00000010  00 0a "));
        assert!(lines[1].ends_with("|..|"));
    }

    #[test]
    fn test_empty_payload_logs_nothing() {
        let dumper = HexDumper;
        let mut meta = dumper.new_connection_metadata();
        assert!(dumper
            .decode(&[], Direction::ClientToServer, &mut meta)
            .is_empty());
        let values = dumper.decode(b"x", Direction::Unknown, &mut meta);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].key, "bytes");
    }
}
