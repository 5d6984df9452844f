use std::borrow::Cow;
use std::time::Duration;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::reassembly::{expected_max_len, PendingBuffers, Reassembled};
use super::{ConnectionTracker, Direction, FlowKey};
use crate::dumper::{DumpValue, Dumper, Value};
use crate::packet::TcpSegment;
use crate::pcap::RawPacket;
use crate::sink::RecordSink;
use crate::target::Target;

/// Memory bounds for stream tracking.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum bytes held for one direction of one connection.
    pub max_pending_bytes: usize,
    /// Connections without traffic for this long (capture time) are forgotten.
    pub connection_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: 16 * 1024 * 1024, // 16 MB per direction
            connection_timeout: Duration::from_secs(300),
        }
    }
}

/// Counters kept by [`StreamProcessor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Packets handed to the processor.
    pub packets: u64,
    /// Packets that decoded to an IPv4/TCP segment.
    pub segments: u64,
    /// Records written to the sink.
    pub records: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_evicted: u64,
    pub sink_errors: u64,
}

/// Connection tracking, reassembly and dispatch for one packet stream.
///
/// Owns all tracking tables; the pipeline runs exactly one processor on its
/// consumer task, so none of the tables need synchronization.
pub struct StreamProcessor<D: Dumper, K> {
    dumper: D,
    sink: K,
    target: Target,
    extra_values: Vec<DumpValue>,
    config: StreamConfig,
    tracker: ConnectionTracker<D::State>,
    pending: PendingBuffers,
    stats: StreamStats,
    last_sweep_us: Option<i64>,
}

impl<D: Dumper, K: RecordSink> StreamProcessor<D, K> {
    pub fn new(
        dumper: D,
        sink: K,
        target: Target,
        extra_values: Vec<DumpValue>,
        config: StreamConfig,
    ) -> Self {
        let pending = PendingBuffers::new(config.max_pending_bytes);
        Self {
            dumper,
            sink,
            target,
            extra_values,
            config,
            tracker: ConnectionTracker::new(),
            pending,
            stats: StreamStats::default(),
            last_sweep_us: None,
        }
    }

    /// Process one captured frame. Frames without IPv4/TCP are ignored.
    pub fn process(&mut self, packet: &RawPacket) {
        self.stats.packets += 1;
        match TcpSegment::decode(packet) {
            Some(segment) => self.process_segment(packet.timestamp_us, &segment),
            None => trace!(frame = packet.frame_number, "not an IPv4/TCP frame"),
        }
    }

    /// Process one decoded segment captured at `timestamp_us`.
    pub fn process_segment(&mut self, timestamp_us: i64, segment: &TcpSegment<'_>) {
        self.stats.segments += 1;

        let direction = Direction::classify(&self.target, segment.src, segment.dst);
        let src_to_dst = FlowKey::new(segment.src, segment.dst);
        let dst_to_src = src_to_dst.reversed();
        let flags = segment.flags;

        let key = match direction {
            Direction::ClientToServer => src_to_dst,
            Direction::ServerToClient => dst_to_src,
            // The SYN sender is assumed to be the client, the SYN+ACK sender the server
            Direction::Unknown if flags.syn && !flags.ack => src_to_dst,
            Direction::Unknown if flags.syn => dst_to_src,
            Direction::Unknown => self.resolve_unknown(src_to_dst, dst_to_src),
        };

        if flags.syn && !flags.ack {
            let fresh = self.dumper.new_connection_metadata();
            let conn_id = self.tracker.open(key, segment.mss, fresh);
            self.pending.reset(key);
            self.pending.remove(&key.reversed());
            self.stats.connections_opened += 1;
            debug!(flow = %key, conn_id = %conn_id, mss = ?segment.mss, "connection opened");
        } else if flags.syn {
            let dumper = &self.dumper;
            if self
                .tracker
                .handshake_reply(key, segment.mss, || dumper.new_connection_metadata())
            {
                self.stats.connections_opened += 1;
                debug!(flow = %key, "SYN+ACK without SYN, connection synthesized");
            }
        }

        let closing = (flags.fin || flags.rst) && !flags.syn;
        if !closing {
            self.tracker.touch(key, timestamp_us);
        }

        self.reassemble(timestamp_us, segment, direction, key, src_to_dst, dst_to_src);

        if closing {
            self.close(key, direction);
        }

        self.maybe_sweep(timestamp_us);
    }

    fn reassemble(
        &mut self,
        timestamp_us: i64,
        segment: &TcpSegment<'_>,
        direction: Direction,
        key: FlowKey,
        src_to_dst: FlowKey,
        dst_to_src: FlowKey,
    ) {
        let max_len = expected_max_len(self.tracker.mss(&key), segment.header_len);
        // Unknown-direction bytes are buffered per physical orientation
        let slot = if direction == Direction::Unknown {
            src_to_dst
        } else {
            key
        };
        let payload = match self.pending.push(slot, direction, segment.payload, max_len) {
            Reassembled::Empty | Reassembled::Buffered => return,
            Reassembled::Complete(payload) => payload,
        };

        let key = if direction == Direction::Unknown {
            self.resolve_unknown(src_to_dst, dst_to_src)
        } else {
            key
        };
        self.dispatch(timestamp_us, segment, direction, key, payload);
    }

    /// Decode a complete payload and log the resulting record.
    fn dispatch(
        &mut self,
        timestamp_us: i64,
        segment: &TcpSegment<'_>,
        direction: Direction,
        key: FlowKey,
        payload: Cow<'_, [u8]>,
    ) {
        let dumper = &self.dumper;
        let meta = self
            .tracker
            .metadata_or_insert_with(key, || dumper.new_connection_metadata());
        let decoded = dumper.decode(&payload, direction, meta);
        if decoded.is_empty() {
            return;
        }

        let mut record: SmallVec<[DumpValue; 12]> = SmallVec::new();
        record.push(DumpValue::new("ts", Value::Timestamp(timestamp_us)));
        record.push(DumpValue::new("src_addr", segment.src.to_string()));
        record.push(DumpValue::new("dst_addr", segment.dst.to_string()));
        record.extend(decoded);
        record.extend(self.extra_values.iter().cloned());
        record.extend(meta.dump_values.iter().cloned());

        match self.sink.log(&record) {
            Ok(()) => self.stats.records += 1,
            Err(e) => {
                self.stats.sink_errors += 1;
                warn!(error = %e, flow = %key, "failed to log record");
            }
        }
    }

    fn close(&mut self, key: FlowKey, direction: Direction) {
        let mut closed = self.tracker.close(&key);
        if direction == Direction::Unknown {
            // Either orientation may have been used as the canonical key
            closed |= self.tracker.close(&key.reversed());
        }
        self.pending.remove(&key);
        self.pending.remove(&key.reversed());
        if closed {
            self.stats.connections_closed += 1;
            debug!(flow = %key, "connection closed");
        }
    }

    /// Canonical key for an unknown-direction segment: whichever orientation
    /// has live metadata (server→client side wins a tie), else source→destination.
    fn resolve_unknown(&self, src_to_dst: FlowKey, dst_to_src: FlowKey) -> FlowKey {
        if self.tracker.contains(&dst_to_src) {
            dst_to_src
        } else {
            src_to_dst
        }
    }

    fn maybe_sweep(&mut self, now_us: i64) {
        let timeout_us =
            i64::try_from(self.config.connection_timeout.as_micros()).unwrap_or(i64::MAX);
        let last = *self.last_sweep_us.get_or_insert(now_us);
        if now_us.saturating_sub(last) < timeout_us / 4 {
            return;
        }
        self.last_sweep_us = Some(now_us);

        let evicted = self.tracker.evict_idle(now_us, timeout_us);
        for key in &evicted.keys {
            self.pending.remove(key);
            self.pending.remove(&key.reversed());
        }
        if evicted.connections > 0 {
            self.stats.connections_evicted += evicted.connections as u64;
            debug!(count = evicted.connections, "evicted idle connections");
        }
    }

    /// Flush the sink.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn tracker(&self) -> &ConnectionTracker<D::State> {
        &self.tracker
    }

    pub fn pending(&self) -> &PendingBuffers {
        &self.pending
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Consume the processor, returning its sink.
    pub fn into_sink(self) -> K {
        self.sink
    }
}
