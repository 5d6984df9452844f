//! Error types for tcpdp-core.
//!
//! Only set-up and I/O problems are errors here:
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`PcapError`] - Errors from capture file reading
//! - [`CaptureError`] - Errors from opening or reading a capture source
//! - [`TargetError`] - Errors from parsing a `host:port` target
//!
//! A malformed packet is never an error: it is skipped by the stream processor.

use thiserror::Error;

/// Main error type for tcpdp-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing a capture file
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// Error from a capture source
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Invalid probe target
    #[error("Target error: {0}")]
    Target(#[from] TargetError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline task panicked or was aborted
    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors related to PCAP file reading.
#[derive(Error, Debug)]
pub enum PcapError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid PCAP format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },
}

/// Errors related to capture sources.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The interface could not be opened for capture
    #[error("cannot open interface {interface}: {reason}")]
    Open { interface: String, reason: String },

    /// The capture filter was rejected
    #[error("invalid capture filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },

    /// Reading from an open capture failed
    #[error("capture read failed: {reason}")]
    Read { reason: String },
}

/// Errors related to target parsing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TargetError {
    /// Port is not a number in 0..=65535
    #[error("invalid port {0:?}")]
    InvalidPort(String),

    /// Host could not be resolved to an IPv4 address
    #[error("cannot resolve {0:?} to an IPv4 address")]
    Unresolvable(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
