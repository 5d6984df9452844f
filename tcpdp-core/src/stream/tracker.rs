use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::FlowKey;
use crate::dumper::{ConnectionMetadata, CONN_ID_KEY, MSS_KEY};

/// Connection metadata and negotiated MSS per canonical flow key.
///
/// The tracker is a state machine driven by TCP control flags, not a protocol
/// validator: partial or repeated handshakes are accepted as they come.
#[derive(Debug)]
pub struct ConnectionTracker<S> {
    metadata: HashMap<FlowKey, ConnectionMetadata<S>>,
    mss: HashMap<FlowKey, u16>,
    /// Capture time (microseconds) of the last segment seen per key.
    last_seen: HashMap<FlowKey, i64>,
}

impl<S> ConnectionTracker<S> {
    pub fn new() -> Self {
        Self {
            metadata: HashMap::new(),
            mss: HashMap::new(),
            last_seen: HashMap::new(),
        }
    }

    /// SYN without ACK: start a new connection under `key`.
    ///
    /// Existing state for the key is discarded (port reuse / retransmitted SYN).
    /// Returns the new connection id.
    pub fn open(
        &mut self,
        key: FlowKey,
        mss: Option<u16>,
        fresh: ConnectionMetadata<S>,
    ) -> String {
        if self.metadata.remove(&key).is_some() {
            debug!(flow = %key, "SYN for tracked flow, restarting connection");
        }
        let (conn_id, meta) = with_conn_id(fresh);
        self.metadata.insert(key, meta);
        match mss {
            Some(mss) => self.mss.insert(key, mss),
            None => self.mss.remove(&key),
        };
        conn_id
    }

    /// SYN+ACK: record the responder's MSS under `key`.
    ///
    /// Synthesizes metadata when the SYN was not observed. The stored MSS only
    /// ever shrinks; every observed value is appended to the dump values.
    /// Returns `true` when metadata had to be synthesized.
    pub fn handshake_reply(
        &mut self,
        key: FlowKey,
        mss: Option<u16>,
        fresh: impl FnOnce() -> ConnectionMetadata<S>,
    ) -> bool {
        let mut synthesized = false;
        let meta = self.metadata.entry(key).or_insert_with(|| {
            synthesized = true;
            with_conn_id(fresh()).1
        });
        if let Some(mss) = mss {
            meta.push(MSS_KEY, mss);
            self.mss
                .entry(key)
                .and_modify(|current| *current = (*current).min(mss))
                .or_insert(mss);
        }
        synthesized
    }

    /// FIN or RST: forget everything about `key`. Returns `true` if metadata existed.
    pub fn close(&mut self, key: &FlowKey) -> bool {
        self.mss.remove(key);
        self.last_seen.remove(key);
        self.metadata.remove(key).is_some()
    }

    pub fn contains(&self, key: &FlowKey) -> bool {
        self.metadata.contains_key(key)
    }

    pub fn metadata(&self, key: &FlowKey) -> Option<&ConnectionMetadata<S>> {
        self.metadata.get(key)
    }

    /// Metadata for `key`, created with `fresh` (without a connection id) if absent.
    pub fn metadata_or_insert_with(
        &mut self,
        key: FlowKey,
        fresh: impl FnOnce() -> ConnectionMetadata<S>,
    ) -> &mut ConnectionMetadata<S> {
        self.metadata.entry(key).or_insert_with(fresh)
    }

    pub fn mss(&self, key: &FlowKey) -> Option<u16> {
        self.mss.get(key).copied()
    }

    pub fn touch(&mut self, key: FlowKey, timestamp_us: i64) {
        self.last_seen.insert(key, timestamp_us);
    }

    /// Drop keys whose last segment is older than `timeout_us` at `now_us`.
    pub fn evict_idle(&mut self, now_us: i64, timeout_us: i64) -> Evicted {
        let mut keys = Vec::new();
        self.last_seen.retain(|key, seen| {
            if now_us.saturating_sub(*seen) > timeout_us {
                keys.push(*key);
                false
            } else {
                true
            }
        });
        let mut connections = 0;
        for key in &keys {
            self.mss.remove(key);
            if self.metadata.remove(key).is_some() {
                connections += 1;
            }
        }
        Evicted { keys, connections }
    }

    /// Number of connections with live metadata.
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

impl<S> Default for ConnectionTracker<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`ConnectionTracker::evict_idle`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Evicted {
    /// Every stale key, including flows that never carried metadata.
    pub keys: Vec<FlowKey>,
    /// Stale keys that held connection metadata.
    pub connections: usize,
}

fn with_conn_id<S>(mut meta: ConnectionMetadata<S>) -> (String, ConnectionMetadata<S>) {
    let conn_id = Uuid::new_v4().simple().to_string();
    meta.dump_values.clear();
    meta.push(CONN_ID_KEY, conn_id.as_str());
    (conn_id, meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dumper::{find, Value};
    use crate::packet::tests::addr;

    fn key() -> FlowKey {
        FlowKey::new(addr(10, 0, 0, 1, 54321), addr(10, 0, 0, 5, 5432))
    }

    fn fresh() -> ConnectionMetadata<()> {
        ConnectionMetadata::new(())
    }

    fn mss_values(meta: &ConnectionMetadata<()>) -> Vec<Value> {
        meta.dump_values
            .iter()
            .filter(|dv| dv.key == MSS_KEY)
            .map(|dv| dv.value.clone())
            .collect()
    }

    #[test]
    fn test_open_assigns_conn_id_and_mss() {
        let mut tracker = ConnectionTracker::new();
        let conn_id = tracker.open(key(), Some(1460), fresh());

        let meta = tracker.metadata(&key()).unwrap();
        assert_eq!(meta.conn_id(), Some(conn_id.as_str()));
        assert_eq!(meta.dump_values.len(), 1);
        assert_eq!(tracker.mss(&key()), Some(1460));
    }

    #[test]
    fn test_duplicate_syn_replaces_connection() {
        let mut tracker = ConnectionTracker::new();
        let first = tracker.open(key(), Some(1460), fresh());
        tracker.handshake_reply(key(), Some(1400), fresh);
        let second = tracker.open(key(), None, fresh());

        assert_ne!(first, second);
        let meta = tracker.metadata(&key()).unwrap();
        assert_eq!(meta.conn_id(), Some(second.as_str()));
        assert!(mss_values(meta).is_empty());
        assert_eq!(tracker.mss(&key()), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_handshake_reply_keeps_minimum_mss() {
        let mut tracker = ConnectionTracker::new();
        tracker.open(key(), None, fresh());
        tracker.handshake_reply(key(), Some(1460), fresh);
        tracker.handshake_reply(key(), Some(1400), fresh);
        tracker.handshake_reply(key(), Some(1500), fresh);

        assert_eq!(tracker.mss(&key()), Some(1400));
        let meta = tracker.metadata(&key()).unwrap();
        assert_eq!(
            mss_values(meta),
            vec![Value::UInt(1460), Value::UInt(1400), Value::UInt(1500)]
        );
    }

    #[test]
    fn test_handshake_reply_without_syn_synthesizes() {
        let mut tracker = ConnectionTracker::new();
        assert!(tracker.handshake_reply(key(), Some(1460), fresh));
        assert!(!tracker.handshake_reply(key(), Some(1460), fresh));

        let meta = tracker.metadata(&key()).unwrap();
        assert!(meta.conn_id().is_some());
        assert_eq!(find(&meta.dump_values, MSS_KEY), Some(&Value::UInt(1460)));
    }

    #[test]
    fn test_handshake_reply_without_mss() {
        let mut tracker = ConnectionTracker::new();
        tracker.open(key(), Some(1460), fresh());
        tracker.handshake_reply(key(), None, fresh);
        assert_eq!(tracker.mss(&key()), Some(1460));
        assert!(mss_values(tracker.metadata(&key()).unwrap()).is_empty());
    }

    #[test]
    fn test_close_removes_everything() {
        let mut tracker = ConnectionTracker::new();
        tracker.open(key(), Some(1460), fresh());
        tracker.touch(key(), 10);
        assert!(tracker.close(&key()));
        assert!(!tracker.contains(&key()));
        assert_eq!(tracker.mss(&key()), None);
        assert_eq!(tracker.evict_idle(i64::MAX, 0), Evicted::default());
        assert!(!tracker.close(&key()));
    }

    #[test]
    fn test_evict_idle() {
        let mut tracker = ConnectionTracker::new();
        let other = key().reversed();
        tracker.open(key(), Some(1460), fresh());
        tracker.open(other, None, fresh());
        tracker.touch(key(), 1_000);
        tracker.touch(other, 5_000);

        let evicted = tracker.evict_idle(6_500, 2_000);
        assert_eq!(evicted.keys, vec![key()]);
        assert_eq!(evicted.connections, 1);
        assert!(!tracker.contains(&key()));
        assert_eq!(tracker.mss(&key()), None);
        assert!(tracker.contains(&other));
    }

    #[test]
    fn test_evict_idle_counts_only_connections() {
        let mut tracker = ConnectionTracker::<()>::new();
        // Pure ACKs touch a key without ever creating metadata
        tracker.touch(key(), 1_000);
        tracker.touch(key().reversed(), 1_000);

        let evicted = tracker.evict_idle(10_000, 2_000);
        assert_eq!(evicted.keys.len(), 2);
        assert_eq!(evicted.connections, 0);
    }
}
