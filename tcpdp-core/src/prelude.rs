//! Convenient re-exports for common usage.
//!
//! ```rust
//! use tcpdp_core::prelude::*;
//!
//! let config = PipelineConfig::default().with_target(Target::new(None, 3306));
//! assert_eq!(bpf_filter(&config.target), "tcp port 3306");
//! ```

// Capture
pub use crate::capture::{CaptureSource, PcapFileSource, VecSource};
pub use crate::pcap::RawPacket;

// Decoding
pub use crate::dumper::{
    ConnectionMetadata, DumpValue, Dumper, DumperKind, HexDumper, MysqlDumper, PgDumper, Value,
};
pub use crate::stream::Direction;

// Pipeline
pub use crate::pipeline::{PacketReader, PipelineConfig, PipelineStats, Shutdown, StopReason};
pub use crate::sink::{CollectSink, RecordSink, TracingSink};
pub use crate::target::{bpf_filter, parse_target, Target};

// Error types
pub use crate::error::{Error, Result};
