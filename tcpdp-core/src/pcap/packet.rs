//! Raw packet representation.

use bytes::Bytes;

/// Link type for BSD loopback (4-byte address family header).
pub const LINKTYPE_NULL: u16 = 0;
/// Link type for Ethernet.
pub const LINKTYPE_ETHERNET: u16 = 1;
/// Link type for raw IP (as written by OpenBSD).
pub const LINKTYPE_RAW_OPENBSD: u16 = 12;
/// Link type for raw IP (as written by some BSDs).
pub const LINKTYPE_RAW_BSD: u16 = 14;
/// Link type for raw IP.
pub const LINKTYPE_RAW: u16 = 101;
/// Link type for Linux cooked capture (the `any` interface).
pub const LINKTYPE_LINUX_SLL: u16 = 113;

/// A raw frame as delivered by a capture source.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// Frame number (1-indexed).
    pub frame_number: u64,

    /// Capture timestamp in microseconds since epoch.
    pub timestamp_us: i64,

    /// Captured length (may be less than original).
    pub captured_length: u32,

    /// Original length on the wire.
    pub original_length: u32,

    /// Link layer type (e.g., 1 = Ethernet).
    pub link_type: u16,

    /// Raw frame bytes.
    pub data: Bytes,
}

impl RawPacket {
    /// Create a new raw packet.
    pub fn new(
        frame_number: u64,
        timestamp_us: i64,
        captured_length: u32,
        original_length: u32,
        link_type: u16,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            frame_number,
            timestamp_us,
            captured_length,
            original_length,
            link_type,
            data: data.into(),
        }
    }

    /// Build a packet whose captured and original lengths equal the data length.
    pub fn from_frame(
        frame_number: u64,
        timestamp_us: i64,
        link_type: u16,
        data: impl Into<Bytes>,
    ) -> Self {
        let data: Bytes = data.into();
        let len = data.len() as u32;
        Self::new(frame_number, timestamp_us, len, len, link_type, data)
    }

    /// Check if the packet was truncated during capture.
    pub fn is_truncated(&self) -> bool {
        self.captured_length < self.original_length
    }
}
