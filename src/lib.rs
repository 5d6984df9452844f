//! tcpdp - TCP packet dumper.
//!
//! Command-line front end over [`tcpdp_core`]: captures or replays TCP traffic,
//! reassembles each connection's payloads and writes one decoded record per
//! protocol message.
//!
//! # Example
//!
//! ```no_run
//! use tcpdp::cli::{OutputFormat, OutputFormatter};
//! use tcpdp_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sink = OutputFormatter::open(OutputFormat::Ltsv, None)?;
//!     let config = PipelineConfig::default().with_target(parse_target("3306")?);
//!     let source = PcapFileSource::open("mysql.pcap")?;
//!     PacketReader::new(MysqlDumper, sink, config)
//!         .read_and_dump(source)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cli;

pub use tcpdp_core::{Error, Result};
