//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - Record output (JSON Lines, LTSV) to stdout or a file

mod args;
mod output;

#[cfg(feature = "live")]
pub use args::ProbeArgs;
pub use args::{Args, Command, DumpArgs, ReadArgs};
pub use output::{OutputFormat, OutputFormatter};
