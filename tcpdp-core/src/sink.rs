//! Record sinks: where assembled dump records go.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::dumper::{DumpValue, Record};

/// Accepts one ordered record per call.
pub trait RecordSink: Send + 'static {
    fn log(&mut self, record: &[DumpValue]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn log(&mut self, record: &[DumpValue]) -> io::Result<()> {
        (**self).log(record)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Collects records in memory; clones share the same collection.
#[derive(Debug, Clone, Default)]
pub struct CollectSink {
    records: Arc<Mutex<Vec<Vec<DumpValue>>>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub fn records(&self) -> Vec<Vec<DumpValue>> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordSink for CollectSink {
    fn log(&mut self, record: &[DumpValue]) -> io::Result<()> {
        self.records.lock().push(record.to_vec());
        Ok(())
    }
}

/// Emits every record as one `info!` event with the record as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn log(&mut self, record: &[DumpValue]) -> io::Result<()> {
        let json = serde_json::to_string(&Record(record))?;
        info!(target: "tcpdp::dump", record = %json, "dump");
        Ok(())
    }
}
