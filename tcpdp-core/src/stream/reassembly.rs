use std::borrow::Cow;
use std::collections::HashMap;

use bytes::BytesMut;
use tracing::debug;

use super::{Direction, FlowKey};
use crate::packet::TCP_BASE_HEADER_LEN;

/// Segment length limit used while no MSS is known for a flow.
pub const DEFAULT_MAX_SEGMENT_LEN: usize = 0xFFFF;

/// Largest payload a segment can carry on this flow.
///
/// TCP options beyond the 20-byte base header eat into the MSS.
pub fn expected_max_len(mss: Option<u16>, tcp_header_len: usize) -> usize {
    match mss {
        Some(mss) => {
            let options_len = tcp_header_len.saturating_sub(TCP_BASE_HEADER_LEN);
            (mss as usize).saturating_sub(options_len)
        }
        None => DEFAULT_MAX_SEGMENT_LEN,
    }
}

/// Pending bytes of one connection, one buffer per direction.
#[derive(Debug, Default)]
struct DirectionBuffers {
    buffers: [BytesMut; 3],
}

impl DirectionBuffers {
    fn get_mut(&mut self, direction: Direction) -> &mut BytesMut {
        &mut self.buffers[direction.index()]
    }

    fn len(&self) -> usize {
        self.buffers.iter().map(BytesMut::len).sum()
    }
}

/// Result of feeding one segment payload.
#[derive(Debug, PartialEq, Eq)]
pub enum Reassembled<'a> {
    /// Empty payload (pure ACK), nothing to do.
    Empty,
    /// The segment filled the MSS; more fragments are expected.
    Buffered,
    /// A logical payload is complete.
    Complete(Cow<'a, [u8]>),
}

/// Accumulates MSS-sized segments until a shorter one marks the end of a payload.
///
/// A segment whose payload exactly fills the flow's expected maximum is treated
/// as a fragment; any other segment completes the logical unit. A genuine
/// message of exactly MSS bytes is therefore merged with the next one.
#[derive(Debug)]
pub struct PendingBuffers {
    flows: HashMap<FlowKey, DirectionBuffers>,
    max_pending_bytes: usize,
}

impl PendingBuffers {
    pub fn new(max_pending_bytes: usize) -> Self {
        Self {
            flows: HashMap::new(),
            max_pending_bytes,
        }
    }

    /// Start `key` with three empty direction buffers, dropping any leftovers.
    pub fn reset(&mut self, key: FlowKey) {
        self.flows.insert(key, DirectionBuffers::default());
    }

    pub fn remove(&mut self, key: &FlowKey) -> bool {
        self.flows.remove(key).is_some()
    }

    pub fn contains(&self, key: &FlowKey) -> bool {
        self.flows.contains_key(key)
    }

    /// Bytes currently pending for one direction of `key`.
    pub fn pending_len(&self, key: &FlowKey, direction: Direction) -> usize {
        self.flows
            .get(key)
            .map_or(0, |b| b.buffers[direction.index()].len())
    }

    /// Bytes pending across all flows.
    pub fn total_len(&self) -> usize {
        self.flows.values().map(DirectionBuffers::len).sum()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Feed one segment payload.
    pub fn push<'a>(
        &mut self,
        key: FlowKey,
        direction: Direction,
        payload: &'a [u8],
        expected_max: usize,
    ) -> Reassembled<'a> {
        if payload.is_empty() {
            return Reassembled::Empty;
        }
        let buffer = self.flows.entry(key).or_default().get_mut(direction);

        if payload.len() == expected_max {
            if buffer.len() + payload.len() > self.max_pending_bytes {
                debug!(
                    flow = %key,
                    %direction,
                    discarded = buffer.len(),
                    "pending buffer limit reached, dispatching segment alone"
                );
                buffer.clear();
                return Reassembled::Complete(Cow::Borrowed(payload));
            }
            buffer.extend_from_slice(payload);
            return Reassembled::Buffered;
        }

        if buffer.is_empty() {
            return Reassembled::Complete(Cow::Borrowed(payload));
        }
        let mut full = Vec::with_capacity(buffer.len() + payload.len());
        full.extend_from_slice(buffer);
        full.extend_from_slice(payload);
        *buffer = BytesMut::new();
        Reassembled::Complete(Cow::Owned(full))
    }
}
