//! Packet ingestion pipeline.
//!
//! Three tasks share one [`Shutdown`]:
//!
//! ```text
//! CaptureSource ──(source queue)──▶ producer ──(internal buffer)──▶ consumer
//!                                                                    │
//!              monitor: samples both queue depths every interval    StreamProcessor
//! ```
//!
//! - the producer moves packets from the source queue into the bounded internal
//!   buffer, waiting when it is full (backpressure reaches the capture source
//!   instead of dropping packets); the end-of-stream sentinel is forwarded and
//!   then triggers [`StopReason::SourceExhausted`]
//! - the consumer owns the [`StreamProcessor`] and with it every tracking table
//! - the monitor only reads queue depths
//!
//! On [`StopReason::Cancelled`] every task exits promptly. On
//! [`StopReason::SourceExhausted`] the consumer drains the buffer up to the
//! sentinel first, so nothing captured before the end of stream is lost.

mod config;
mod monitor;
mod shutdown;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::capture::{CaptureSource, SourceQueue};
use crate::dumper::Dumper;
use crate::error::Result;
use crate::pcap::RawPacket;
use crate::sink::RecordSink;
use crate::stream::{StreamProcessor, StreamStats};

pub use config::{PipelineConfig, DEFAULT_BUFFER_CAPACITY};
pub use monitor::{log_buffer_stats, monitor_buffers, BufferStats, QueueDepth};
pub use shutdown::{Shutdown, ShutdownSignal, StopReason};

/// Summary of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub stream: StreamStats,
    pub stop_reason: StopReason,
}

/// Reads packets from a capture source and dumps decoded records to a sink.
pub struct PacketReader<D: Dumper, K: RecordSink> {
    processor: StreamProcessor<D, K>,
    config: PipelineConfig,
    shutdown: Shutdown,
}

impl<D: Dumper, K: RecordSink> PacketReader<D, K> {
    pub fn new(dumper: D, sink: K, config: PipelineConfig) -> Self {
        let processor = StreamProcessor::new(
            dumper,
            sink,
            config.target,
            config.extra_values.clone(),
            config.stream.clone(),
        );
        Self {
            processor,
            config,
            shutdown: Shutdown::new(),
        }
    }

    /// Handle for stopping the pipeline from outside.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run until the source is exhausted or the pipeline is cancelled.
    pub async fn read_and_dump<S: CaptureSource>(self, source: S) -> Result<PipelineStats> {
        let Self {
            processor,
            config,
            shutdown,
        } = self;

        let queue = SourceQueue::spawn(source, config.source_queue_capacity);
        let (source_rx, source_depth, reader_task) = queue.into_parts();
        let (buffer_tx, buffer_rx) = mpsc::channel(config.buffer_capacity.max(1));
        let buffer_depth = QueueDepth::new(&buffer_tx);

        let monitor = tokio::spawn(monitor_buffers(
            buffer_depth,
            source_depth,
            config.monitor_interval,
            shutdown.subscribe(),
            log_buffer_stats,
        ));
        let producer = tokio::spawn(produce(source_rx, buffer_tx, shutdown.clone()));
        let consumer = tokio::spawn(consume(processor, buffer_rx, shutdown.clone()));

        let consumed = consumer.await;
        // The consumer only ends after a shutdown trigger, unless its buffer closed early
        shutdown.cancel();
        producer.await?;
        monitor.await?;
        let mut processor = consumed?;

        let stop_reason = shutdown.reason().unwrap_or(StopReason::Cancelled);
        if stop_reason == StopReason::SourceExhausted {
            reader_task.await?;
        }

        if let Err(e) = processor.flush() {
            warn!(error = %e, "failed to flush sink");
        }

        let stats = PipelineStats {
            stream: processor.stats(),
            stop_reason,
        };
        info!(
            reason = %stop_reason,
            packets = stats.stream.packets,
            records = stats.stream.records,
            connections_opened = stats.stream.connections_opened,
            connections_closed = stats.stream.connections_closed,
            "packet reader stopped"
        );
        Ok(stats)
    }
}

async fn produce(
    mut source: mpsc::Receiver<Option<RawPacket>>,
    buffer: mpsc::Sender<Option<RawPacket>>,
    shutdown: Shutdown,
) {
    let mut signal = shutdown.subscribe();
    loop {
        let item = tokio::select! {
            reason = signal.wait() => {
                debug!(%reason, "producer stopping");
                return;
            }
            item = source.recv() => item,
        };

        match item {
            Some(Some(packet)) => {
                tokio::select! {
                    reason = signal.wait() => {
                        debug!(%reason, "producer stopping while buffer full");
                        return;
                    }
                    sent = buffer.send(Some(packet)) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            // Sentinel, or the reader went away without one
            Some(None) | None => {
                let _ = buffer.send(None).await;
                shutdown.trigger(StopReason::SourceExhausted);
                return;
            }
        }
    }
}

async fn consume<D: Dumper, K: RecordSink>(
    mut processor: StreamProcessor<D, K>,
    mut buffer: mpsc::Receiver<Option<RawPacket>>,
    shutdown: Shutdown,
) -> StreamProcessor<D, K> {
    let mut signal = shutdown.subscribe();
    let mut draining = false;
    loop {
        tokio::select! {
            biased;

            reason = signal.wait(), if !draining => match reason {
                StopReason::Cancelled => {
                    debug!("consumer cancelled");
                    break;
                }
                StopReason::SourceExhausted => draining = true,
            },
            item = buffer.recv() => match item {
                Some(Some(packet)) => processor.process(&packet),
                Some(None) => {
                    shutdown.trigger(StopReason::SourceExhausted);
                    break;
                }
                None => break,
            },
        }
    }
    processor
}
