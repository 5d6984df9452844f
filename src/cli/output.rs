//! Record output for the command line.
//!
//! Records are written one per line, either as JSON objects with keys in record
//! order or as LTSV (`key:value` pairs separated by tabs).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use clap::ValueEnum;
use tcpdp_core::{DumpValue, Record, RecordSink};

/// Supported record formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON Lines (one JSON object per record)
    Json,
    /// Labeled tab-separated values
    Ltsv,
}

/// Writes dump records in the selected format.
pub struct OutputFormatter<W: Write> {
    format: OutputFormat,
    writer: W,
}

impl OutputFormatter<Box<dyn Write + Send>> {
    /// Write to `path`, or to stdout when no path is given.
    pub fn open(format: OutputFormat, path: Option<&Path>) -> io::Result<Self> {
        let writer: Box<dyn Write + Send> = match path {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            // Stdout is line buffered already
            None => Box::new(io::stdout()),
        };
        Ok(Self::new(format, writer))
    }
}

impl<W: Write> OutputFormatter<W> {
    pub fn new(format: OutputFormat, writer: W) -> Self {
        Self { format, writer }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write one record followed by a newline.
    pub fn write(&mut self, record: &[DumpValue]) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => self.write_json(record),
            OutputFormat::Ltsv => self.write_ltsv(record),
        }
    }

    fn write_json(&mut self, record: &[DumpValue]) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, &Record(record))?;
        self.writer.write_all(b"\n")
    }

    fn write_ltsv(&mut self, record: &[DumpValue]) -> io::Result<()> {
        let line = record
            .iter()
            .map(|dv| format!("{}:{}", escape_ltsv(&dv.key), escape_ltsv(&dv.value.to_string())))
            .collect::<Vec<_>>()
            .join("\t");
        writeln!(self.writer, "{line}")
    }
}

/// Tabs and newlines would break the line structure.
fn escape_ltsv(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

impl<W: Write + Send + 'static> RecordSink for OutputFormatter<W> {
    fn log(&mut self, record: &[DumpValue]) -> io::Result<()> {
        self.write(record)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcpdp_core::Value;

    fn record() -> Vec<DumpValue> {
        vec![
            DumpValue::new("ts", Value::Timestamp(1_700_000_000_000_001)),
            DumpValue::new("src_addr", "10.0.0.1:40000"),
            DumpValue::new("query", "SELECT 1"),
            DumpValue::new("stmt_id", 7u32),
            DumpValue::new("conn_id", "abc"),
        ]
    }

    fn render(format: OutputFormat, record: &[DumpValue]) -> String {
        let mut formatter = OutputFormatter::new(format, Vec::new());
        formatter.write(record).unwrap();
        String::from_utf8(formatter.into_inner()).unwrap()
    }

    #[test]
    fn test_json_keeps_record_order() {
        let out = render(OutputFormat::Json, &record());
        assert_eq!(
            out,
            "{\"ts\":\"2023-11-14T22:13:20.000001Z\",\"src_addr\":\"10.0.0.1:40000\",\
             \"query\":\"SELECT 1\",\"stmt_id\":7,\"conn_id\":\"abc\"}\n"
        );
    }

    #[test]
    fn test_ltsv() {
        let out = render(OutputFormat::Ltsv, &record());
        assert_eq!(
            out,
            "ts:2023-11-14T22:13:20.000001Z\tsrc_addr:10.0.0.1:40000\tquery:SELECT 1\t\
             stmt_id:7\tconn_id:abc\n"
        );
    }

    #[test]
    fn test_ltsv_escapes_line_breaks() {
        let out = render(
            OutputFormat::Ltsv,
            &[DumpValue::new("bytes", "00000000  41\t|A|\nnext")],
        );
        assert_eq!(out, "bytes:00000000  41\\t|A|\\nnext\n");
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn test_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let mut sink = OutputFormatter::open(OutputFormat::Json, Some(&path)).unwrap();
        sink.log(&record()).unwrap();
        sink.log(&[DumpValue::new("query", "SELECT 2")]).unwrap();
        RecordSink::flush(&mut sink).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "{\"query\":\"SELECT 2\"}");
    }
}
