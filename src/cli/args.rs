//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tcpdp_core::pipeline::DEFAULT_BUFFER_CAPACITY;
use tcpdp_core::DumperKind;

use super::OutputFormat;

/// Reassemble TCP streams and dump decoded MySQL/PostgreSQL traffic.
#[derive(Parser, Debug)]
#[command(name = "tcpdp")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture live traffic from a network interface
    #[cfg(feature = "live")]
    Probe(ProbeArgs),

    /// Replay a pcap/pcapng capture file
    Read(ReadArgs),
}

#[cfg(feature = "live")]
#[derive(ClapArgs, Debug)]
pub struct ProbeArgs {
    /// Interface to capture on
    #[arg(short = 'i', long = "interface", value_name = "IFACE")]
    pub interface: String,

    #[command(flatten)]
    pub dump: DumpArgs,
}

#[derive(ClapArgs, Debug)]
pub struct ReadArgs {
    /// Capture file to replay (.pcap, .pcapng, optionally gzipped)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[command(flatten)]
    pub dump: DumpArgs,
}

/// Options shared by every subcommand.
#[derive(ClapArgs, Debug)]
pub struct DumpArgs {
    /// Server to watch: "host:port", "host" or "port"; empty matches everything
    #[arg(short = 't', long = "target", value_name = "TARGET", default_value = "")]
    pub target: String,

    /// Payload decoder
    #[arg(short = 'd', long = "dumper", value_name = "DUMPER", default_value = "hex")]
    pub dumper: DumperKind,

    /// Internal packet buffer capacity
    #[arg(short = 'B', long = "buffer-size", default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub buffer_size: usize,

    /// Write records to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "OUTPUT_FILE")]
    pub output: Option<PathBuf>,

    /// Record format
    #[arg(short = 'f', long = "format", value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Extra key=value appended to every record (repeatable)
    #[arg(short = 'a', long = "append", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub append: Vec<(String, String)>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}
