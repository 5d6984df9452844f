//! TCP connection tracking and payload reassembly.
//!
//! This module turns a sequence of decoded TCP segments into complete
//! application payloads:
//!
//! - [`Direction`] / [`FlowKey`]: which way a segment travels and which
//!   connection it belongs to
//! - [`ConnectionTracker`]: per-connection metadata and MSS, driven by
//!   SYN, SYN+ACK and FIN/RST
//! - [`PendingBuffers`]: MSS-boundary reassembly per connection and direction
//! - [`StreamProcessor`]: glues the above to a [`Dumper`](crate::dumper::Dumper)
//!   and a [`RecordSink`](crate::sink::RecordSink)
//!
//! Segments are assumed to arrive in transmission order; no sequence number
//! reordering is done.

mod flow;
mod processor;
mod reassembly;
mod tracker;

pub use flow::{Direction, FlowKey};
pub use processor::{StreamConfig, StreamProcessor, StreamStats};
pub use reassembly::{expected_max_len, PendingBuffers, Reassembled, DEFAULT_MAX_SEGMENT_LEN};
pub use tracker::{ConnectionTracker, Evicted};
