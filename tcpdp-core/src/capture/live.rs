use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use ::pcap::{Active, Capture};
use tracing::{debug, info};

use super::CaptureSource;
use crate::error::{CaptureError, Result};
use crate::pcap::RawPacket;

/// Snapshot length for live capture.
const SNAPLEN: i32 = 0xFFFF;
/// Read timeout; the stop flag is checked at least this often.
const READ_TIMEOUT_MS: i32 = 500;

/// Requests a [`LiveSource`] to end its stream.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live capture from a network interface.
pub struct LiveSource {
    capture: Capture<Active>,
    link_type: u16,
    frame_number: u64,
    stop: StopHandle,
}

impl LiveSource {
    /// Open `interface` in promiscuous, immediate mode and apply `filter` (BPF).
    pub fn open(interface: &str, filter: &str) -> Result<Self> {
        let open_err = |e: ::pcap::Error| CaptureError::Open {
            interface: interface.to_string(),
            reason: e.to_string(),
        };
        let mut capture = Capture::from_device(interface)
            .map_err(open_err)?
            .promisc(true)
            .immediate_mode(true)
            .snaplen(SNAPLEN)
            .timeout(READ_TIMEOUT_MS)
            .open()
            .map_err(open_err)?;

        capture
            .filter(filter, true)
            .map_err(|e| CaptureError::Filter {
                filter: filter.to_string(),
                reason: e.to_string(),
            })?;

        let link_type = u16::try_from(capture.get_datalink().0).unwrap_or_default();
        info!(interface, filter, link_type, "live capture started");

        Ok(Self {
            capture,
            link_type,
            frame_number: 0,
            stop: StopHandle::default(),
        })
    }

    /// Handle that ends the stream from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

impl CaptureSource for LiveSource {
    fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        loop {
            if self.stop.is_stopped() {
                debug!(frames = self.frame_number, "live capture stopped");
                return Ok(None);
            }
            match self.capture.next_packet() {
                Ok(packet) => {
                    self.frame_number += 1;
                    let ts = &packet.header.ts;
                    let timestamp_us = ts.tv_sec as i64 * 1_000_000 + ts.tv_usec as i64;
                    return Ok(Some(RawPacket::new(
                        self.frame_number,
                        timestamp_us,
                        packet.header.caplen,
                        packet.header.len,
                        self.link_type,
                        Bytes::copy_from_slice(packet.data),
                    )));
                }
                Err(::pcap::Error::TimeoutExpired) => continue,
                Err(::pcap::Error::NoMorePackets) => return Ok(None),
                Err(e) => {
                    return Err(CaptureError::Read {
                        reason: e.to_string(),
                    }
                    .into())
                }
            }
        }
    }

    fn link_type(&self) -> u16 {
        self.link_type
    }
}
