//! # tcpdp-core
//!
//! Passive TCP capture, connection tracking and protocol dumping.
//!
//! This crate turns captured frames into structured records: it tracks TCP
//! connections by their control flags, reassembles payloads that were split at
//! the negotiated MSS, and hands complete payloads to a protocol decoder
//! ([`Dumper`]) whose key/value output is written to a [`RecordSink`].
//! It never modifies the traffic it observes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tcpdp_core::prelude::*;
//!
//! # async fn run() -> tcpdp_core::Result<()> {
//! let config = PipelineConfig::default().with_target(parse_target("10.0.0.5:5432")?);
//! let source = PcapFileSource::open("capture.pcap")?;
//! let reader = PacketReader::new(PgDumper, TracingSink, config);
//! let stats = reader.read_and_dump(source).await?;
//! println!("{} records", stats.stream.records);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         tcpdp-core                                  |
//! +---------------------------------------------------------------------+
//! |  capture/   - CaptureSource, file/live/in-memory sources, queue     |
//! |  pcap/      - PCAP/PCAPNG reading, gzip                             |
//! |  packet/    - link layer, IPv4 and TCP decoding, MSS option         |
//! |  stream/    - direction, connection tracking, MSS reassembly        |
//! |  dumper/    - Dumper trait, hex/MySQL/PostgreSQL decoders           |
//! |  pipeline/  - producer/consumer tasks, buffer monitor, shutdown     |
//! |  sink       - record sinks                                          |
//! |  target     - host:port parsing, BPF filter strings                 |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Crate Features
//!
//! - `live` - live capture from a network interface (links libpcap)

pub mod capture;
pub mod dumper;
pub mod error;
pub mod packet;
pub mod pcap;
pub mod pipeline;
pub mod prelude;
pub mod sink;
pub mod stream;
pub mod target;

pub use capture::{CaptureSource, PcapFileSource, SourceQueue, VecSource};
#[cfg(feature = "live")]
pub use capture::{LiveSource, StopHandle};
pub use dumper::{
    ConnectionMetadata, DumpValue, Dumper, DumperKind, HexDumper, MysqlDumper, PgDumper, Record,
    Value,
};
pub use error::{CaptureError, Error, PcapError, Result, TargetError};
pub use packet::{TcpFlags, TcpSegment};
pub use pcap::{PcapReader, RawPacket};
pub use pipeline::{PacketReader, PipelineConfig, PipelineStats, Shutdown, StopReason};
pub use sink::{CollectSink, RecordSink, TracingSink};
pub use stream::{ConnectionTracker, Direction, FlowKey, StreamConfig, StreamProcessor, StreamStats};
pub use target::{bpf_filter, parse_target, Target};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
