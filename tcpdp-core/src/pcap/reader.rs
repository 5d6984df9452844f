//! PCAP/PCAPNG capture file reader.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use pcap_parser::pcapng::Block;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError as ParseError, PcapNGReader};

use super::packet::LINKTYPE_ETHERNET;
use super::RawPacket;
use crate::error::{Error, PcapError};

/// Read buffer size; also the largest record the parser can hold.
const BUFFER_SIZE: usize = 65536;

/// Size of the legacy PCAP global header.
const LEGACY_HEADER_LEN: usize = 24;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

type Source = BufReader<Box<dyn Read + Send>>;

/// Sequential reader over the frames of a capture file.
///
/// Handles legacy PCAP (micro- and nanosecond variants, either byte order) and
/// PCAPNG, each optionally gzip-compressed. Timestamps are normalized to
/// microseconds.
pub struct PcapReader {
    format: Format,
    frame_number: u64,
    link_type: u16,
}

enum Format {
    Legacy {
        reader: LegacyPcapReader<Source>,
        nanosecond: bool,
    },
    Ng(PcapNGReader<Source>),
}

/// A record lifted out of the parser's buffer.
struct Record {
    timestamp_us: i64,
    captured_length: u32,
    original_length: u32,
    data: Vec<u8>,
}

impl PcapReader {
    /// Open a capture file; gzip is detected by extension or magic bytes.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let gzipped = is_gzip_file(path)?;

        let mut header = Vec::with_capacity(LEGACY_HEADER_LEN);
        open_source(path, gzipped)?
            .take(LEGACY_HEADER_LEN as u64)
            .read_to_end(&mut header)
            .map_err(|e| invalid(format!("Failed to read file header: {e}")))?;

        // The parser wants the stream from its first byte
        Self::with_header(&header, open_source(path, gzipped)?)
    }

    /// Read an uncompressed capture held in memory.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let data = data.into();
        let header = data[..data.len().min(LEGACY_HEADER_LEN)].to_vec();
        let reader: Box<dyn Read + Send> = Box::new(Cursor::new(data));
        Self::with_header(&header, BufReader::with_capacity(BUFFER_SIZE, reader))
    }

    fn with_header(header: &[u8], source: Source) -> Result<Self, Error> {
        let Some(magic) = header.get(..4) else {
            return Err(invalid("File too short to read magic number".to_string()));
        };
        // (little endian, nanosecond) for the legacy variants
        let legacy = match magic {
            [0xd4, 0xc3, 0xb2, 0xa1] => Some((true, false)),
            [0xa1, 0xb2, 0xc3, 0xd4] => Some((false, false)),
            [0x4d, 0x3c, 0xb2, 0xa1] => Some((true, true)),
            [0xa1, 0xb2, 0x3c, 0x4d] => Some((false, true)),
            [0x0a, 0x0d, 0x0d, 0x0a] => None,
            _ => return Err(invalid(format!("Unknown magic number: {magic:02x?}"))),
        };

        let Some((little_endian, nanosecond)) = legacy else {
            let reader = PcapNGReader::new(BUFFER_SIZE, source)
                .map_err(|e| invalid(format!("Failed to parse PCAPNG header: {e}")))?;
            // Replaced by the first interface description block
            return Ok(Self::with_format(Format::Ng(reader), LINKTYPE_ETHERNET));
        };

        let reader = LegacyPcapReader::new(BUFFER_SIZE, source)
            .map_err(|e| invalid(format!("Failed to parse PCAP header: {e}")))?;
        let link_type = header
            .get(20..24)
            .and_then(|raw| <[u8; 4]>::try_from(raw).ok())
            .map(|raw| {
                if little_endian {
                    u32::from_le_bytes(raw)
                } else {
                    u32::from_be_bytes(raw)
                }
            })
            .and_then(|link| u16::try_from(link).ok())
            .unwrap_or(LINKTYPE_ETHERNET);
        Ok(Self::with_format(
            Format::Legacy { reader, nanosecond },
            link_type,
        ))
    }

    fn with_format(format: Format, link_type: u16) -> Self {
        Self {
            format,
            frame_number: 0,
            link_type,
        }
    }

    /// Link type of the frames read so far (PCAPNG: of the latest interface).
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Number of frames returned so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Read the next frame. Returns `Ok(None)` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        let link_type = &mut self.link_type;
        let record = match &mut self.format {
            Format::Legacy { reader, nanosecond } => {
                let nanosecond = *nanosecond;
                next_record(reader, |block| match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        *link_type = header.network.0 as u16;
                        None
                    }
                    PcapBlockOwned::Legacy(packet) => {
                        let sub_second = if nanosecond {
                            i64::from(packet.ts_usec) / 1_000
                        } else {
                            i64::from(packet.ts_usec)
                        };
                        Some(Record {
                            timestamp_us: i64::from(packet.ts_sec) * 1_000_000 + sub_second,
                            captured_length: packet.caplen,
                            original_length: packet.origlen,
                            data: packet.data.to_vec(),
                        })
                    }
                    _ => None,
                })?
            }
            Format::Ng(reader) => next_record(reader, |block| match block {
                PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                    *link_type = idb.linktype.0 as u16;
                    None
                }
                // Assumes the default if_tsresol of microseconds
                PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => Some(Record {
                    timestamp_us: (i64::from(epb.ts_high) << 32) | i64::from(epb.ts_low),
                    captured_length: epb.caplen,
                    original_length: epb.origlen,
                    data: epb.data.to_vec(),
                }),
                PcapBlockOwned::NG(Block::SimplePacket(spb)) => Some(Record {
                    timestamp_us: 0,
                    captured_length: spb.data.len() as u32,
                    original_length: spb.origlen,
                    data: spb.data.to_vec(),
                }),
                _ => None,
            })?,
        };

        Ok(record.map(|record| {
            self.frame_number += 1;
            RawPacket::new(
                self.frame_number,
                record.timestamp_us,
                record.captured_length,
                record.original_length,
                self.link_type,
                record.data,
            )
        }))
    }
}

/// Walk blocks until `visit` turns one into a record, refilling as needed.
fn next_record<R: PcapReaderIterator>(
    reader: &mut R,
    mut visit: impl FnMut(PcapBlockOwned<'_>) -> Option<Record>,
) -> Result<Option<Record>, Error> {
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let record = visit(block);
                reader.consume(offset);
                if record.is_some() {
                    return Ok(record);
                }
            }
            Err(ParseError::Eof) => return Ok(None),
            Err(ParseError::Incomplete(_)) => reader
                .refill()
                .map_err(|e| invalid(format!("Refill error: {e}")))?,
            Err(e) => return Err(invalid(format!("Parse error: {e}"))),
        }
    }
}

fn invalid(reason: String) -> Error {
    Error::Pcap(PcapError::InvalidFormat { reason })
}

fn not_found(path: &Path) -> Error {
    Error::Pcap(PcapError::FileNotFound {
        path: path.display().to_string(),
    })
}

fn open_source(path: &Path, gzipped: bool) -> Result<Source, Error> {
    let file = File::open(path).map_err(|_| not_found(path))?;
    let reader: Box<dyn Read + Send> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(BufReader::with_capacity(BUFFER_SIZE, reader))
}

/// Gzip by extension, else by the first two bytes.
fn is_gzip_file(path: &Path) -> Result<bool, Error> {
    if is_gzip_extension(path) {
        return Ok(true);
    }
    let mut magic = [0u8; 2];
    let mut file = File::open(path).map_err(|_| not_found(path))?;
    // Shorter than two bytes cannot be gzip
    Ok(file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC)
}

/// Whether the file name ends in `.gz` (case-insensitive).
pub fn is_gzip_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|f| f.to_str())
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(".gz"))
}

impl Iterator for PcapReader {
    type Item = Result<RawPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Build a little-endian microsecond PCAP file holding the given frames.
    pub(crate) fn build_pcap(link_type: u32, frames: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();

        data.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]); // Magic (little endian)
        data.extend_from_slice(&[0x02, 0x00]); // Version major (2)
        data.extend_from_slice(&[0x04, 0x00]); // Version minor (4)
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Thiszone
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Sigfigs
        data.extend_from_slice(&[0xff, 0xff, 0x00, 0x00]); // Snaplen (65535)
        data.extend_from_slice(&link_type.to_le_bytes());

        for (ts_sec, ts_usec, frame) in frames {
            let len = frame.len() as u32;
            data.extend_from_slice(&ts_sec.to_le_bytes());
            data.extend_from_slice(&ts_usec.to_le_bytes());
            data.extend_from_slice(&len.to_le_bytes());
            data.extend_from_slice(&len.to_le_bytes());
            data.extend_from_slice(frame);
        }

        data
    }

    const ETH_ONLY: [u8; 14] = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // Dst MAC
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // Src MAC
        0x08, 0x00, // EtherType (IPv4)
    ];

    #[test]
    fn test_detect_gzip_by_extension() {
        assert!(is_gzip_extension("test.pcap.gz"));
        assert!(is_gzip_extension("TEST.PCAP.GZ"));
        assert!(!is_gzip_extension("test.pcap"));
        assert!(!is_gzip_extension("test.pcapng"));
    }

    #[test]
    fn test_detect_gzip_by_magic_bytes() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&GZIP_MAGIC).unwrap();
        temp.write_all(&[0x00, 0x00]).unwrap();
        temp.flush().unwrap();

        assert!(is_gzip_file(temp.path()).unwrap());
    }

    #[test]
    fn test_read_frames_and_timestamps() {
        let pcap = build_pcap(
            1,
            &[
                (1_000_000_000, 250, &ETH_ONLY[..]),
                (1_000_000_001, 0, &ETH_ONLY[..]),
            ],
        );
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&pcap).unwrap();
        temp.flush().unwrap();

        let mut reader = PcapReader::open(temp.path()).unwrap();
        let first = reader.next_packet().unwrap().unwrap();
        assert_eq!(first.frame_number, 1);
        assert_eq!(first.timestamp_us, 1_000_000_000_000_250);
        assert_eq!(first.link_type, 1);
        assert_eq!(first.data.len(), 14);

        let second = reader.next_packet().unwrap().unwrap();
        assert_eq!(second.frame_number, 2);
        assert!(reader.next_packet().unwrap().is_none());
        assert_eq!(reader.frame_count(), 2);
    }

    #[test]
    fn test_link_type_from_header() {
        let pcap = build_pcap(113, &[(1, 0, &[0u8; 16][..])]);
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&pcap).unwrap();
        temp.flush().unwrap();

        let mut reader = PcapReader::open(temp.path()).unwrap();
        // Known before the first record is read
        assert_eq!(reader.link_type(), 113);
        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.link_type, 113);
    }

    #[test]
    fn test_create_and_read_gzip_pcap() {
        let pcap = build_pcap(1, &[(1_000_000_000, 0, &ETH_ONLY[..])]);

        let temp = NamedTempFile::with_suffix(".pcap.gz").unwrap();
        {
            let file = File::create(temp.path()).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&pcap).unwrap();
            encoder.finish().unwrap();
        }

        let reader = PcapReader::open(temp.path());
        assert!(reader.is_ok(), "Failed to open gzipped PCAP: {:?}", reader.err());
        let packets: Vec<_> = reader.unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn test_unknown_magic_is_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0]).unwrap();
        temp.flush().unwrap();

        assert!(matches!(
            PcapReader::open(temp.path()),
            Err(Error::Pcap(PcapError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn test_from_bytes() {
        let pcap = build_pcap(101, &[(5, 0, &[0x45u8; 20][..])]);
        let mut reader = PcapReader::from_bytes(pcap).unwrap();
        assert_eq!(reader.next_packet().unwrap().unwrap().link_type, 101);
        assert!(reader.next_packet().unwrap().is_none());

        assert!(matches!(
            PcapReader::from_bytes(vec![0xd4, 0xc3]),
            Err(Error::Pcap(PcapError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            PcapReader::open("/nonexistent/capture.pcap"),
            Err(Error::Pcap(PcapError::FileNotFound { .. }))
        ));
    }
}
