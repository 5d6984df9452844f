//! Capture file reading.
//!
//! This module reads PCAP and PCAPNG files (optionally gzipped) and
//! exposes raw link-layer frames for the stream pipeline.

pub mod packet;
pub(crate) mod reader;

pub use packet::RawPacket;
pub use reader::{is_gzip_extension, PcapReader};
