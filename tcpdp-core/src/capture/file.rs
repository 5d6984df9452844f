use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::CaptureSource;
use crate::error::Result;
use crate::pcap::{PcapReader, RawPacket};

/// Replays a PCAP/PCAPNG file (optionally gzip-compressed).
pub struct PcapFileSource {
    path: PathBuf,
    reader: PcapReader,
}

impl PcapFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = PcapReader::open(&path)?;
        debug!(path = %path.display(), link_type = reader.link_type(), "opened capture file");
        Ok(Self { path, reader })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for PcapFileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcapFileSource")
            .field("path", &self.path)
            .field("link_type", &self.reader.link_type())
            .finish_non_exhaustive()
    }
}

impl CaptureSource for PcapFileSource {
    fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        self.reader.next_packet()
    }

    fn link_type(&self) -> u16 {
        self.reader.link_type()
    }
}
