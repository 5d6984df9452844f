use std::time::Duration;

use crate::capture::DEFAULT_SOURCE_QUEUE_CAPACITY;
use crate::dumper::DumpValue;
use crate::stream::StreamConfig;
use crate::target::Target;

/// Default capacity of the internal packet buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Configuration for [`PacketReader`](super::PacketReader).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Host/port used to classify segment direction.
    pub target: Target,
    /// Capacity of the internal packet buffer between producer and consumer.
    pub buffer_capacity: usize,
    /// Capacity of the queue fed by the capture source.
    pub source_queue_capacity: usize,
    /// How often the buffer monitor samples queue depths.
    pub monitor_interval: Duration,
    /// Values appended to every record (after the decoded values).
    pub extra_values: Vec<DumpValue>,
    pub stream: StreamConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: Target::any(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            source_queue_capacity: DEFAULT_SOURCE_QUEUE_CAPACITY,
            monitor_interval: Duration::from_secs(1),
            extra_values: Vec::new(),
            stream: StreamConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_extra_value(mut self, value: DumpValue) -> Self {
        self.extra_values.push(value);
        self
    }
}
