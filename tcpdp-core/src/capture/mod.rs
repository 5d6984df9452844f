//! Capture sources and the bounded queue they feed.
//!
//! A [`CaptureSource`] is a blocking iterator over raw frames. [`SourceQueue`]
//! runs one on a blocking thread and exposes its output as a bounded channel
//! of `Option<RawPacket>`, where `None` is the end-of-stream sentinel.

mod file;
#[cfg(feature = "live")]
mod live;

use std::collections::VecDeque;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::pcap::RawPacket;
use crate::pipeline::QueueDepth;

pub use file::PcapFileSource;
#[cfg(feature = "live")]
pub use live::{LiveSource, StopHandle};

/// Default capacity of the source queue.
pub const DEFAULT_SOURCE_QUEUE_CAPACITY: usize = 1000;

/// A blocking producer of captured frames.
pub trait CaptureSource: Send + 'static {
    /// Next frame, or `Ok(None)` once the source is exhausted.
    fn next_packet(&mut self) -> Result<Option<RawPacket>>;

    /// Link type of the frames this source produces.
    fn link_type(&self) -> u16;
}

/// In-memory source, mostly for tests and replays of pre-built frames.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    packets: VecDeque<RawPacket>,
    link_type: u16,
}

impl VecSource {
    pub fn new(packets: impl IntoIterator<Item = RawPacket>) -> Self {
        let packets: VecDeque<RawPacket> = packets.into_iter().collect();
        let link_type = packets.front().map_or(0, |p| p.link_type);
        Self { packets, link_type }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

impl CaptureSource for VecSource {
    fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        Ok(self.packets.pop_front())
    }

    fn link_type(&self) -> u16 {
        self.link_type
    }
}

/// A capture source running on a blocking thread behind a bounded channel.
pub struct SourceQueue {
    rx: mpsc::Receiver<Option<RawPacket>>,
    depth: QueueDepth<Option<RawPacket>>,
    task: JoinHandle<()>,
}

impl SourceQueue {
    /// Start reading `source` into a channel of `capacity` packets.
    ///
    /// Must be called within a tokio runtime. The reader stops at end of
    /// stream, on a read error (logged), or when the receiving side is dropped.
    pub fn spawn<S: CaptureSource>(mut source: S, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let depth = QueueDepth::new(&tx);

        let task = tokio::task::spawn_blocking(move || {
            let mut read = 0u64;
            loop {
                let packet = match source.next_packet() {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!(error = %e, "capture source failed, ending stream");
                        None
                    }
                };
                let end = packet.is_none();
                if tx.blocking_send(packet).is_err() {
                    debug!(read, "source queue receiver dropped");
                    return;
                }
                if end {
                    debug!(read, "capture source exhausted");
                    return;
                }
                read += 1;
            }
        });

        Self { rx, depth, task }
    }

    /// Depth probe for the monitor.
    pub fn depth(&self) -> QueueDepth<Option<RawPacket>> {
        self.depth.clone()
    }

    /// Next item: `Some(None)` is the sentinel, `None` means the reader is gone.
    pub async fn recv(&mut self) -> Option<Option<RawPacket>> {
        self.rx.recv().await
    }

    /// Stop receiving; the reader exits at its next send.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<Option<RawPacket>>,
        QueueDepth<Option<RawPacket>>,
        JoinHandle<()>,
    ) {
        (self.rx, self.depth, self.task)
    }
}
