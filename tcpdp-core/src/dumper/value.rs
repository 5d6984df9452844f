//! Key/value types emitted by dumpers and the dispatch step.

use std::fmt;

use chrono::{SecondsFormat, TimeZone, Utc};
use compact_str::CompactString;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A loggable value.
///
/// Values are owned: records outlive the packet buffers they were decoded from.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String (small strings stay inline)
    Str(CompactString),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Capture timestamp in microseconds since the Unix epoch
    Timestamp(i64),
    /// List of values (e.g. bound statement parameters)
    List(Vec<Value>),
    /// Null/missing value
    Null,
}

impl Value {
    /// Try to get as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to get as u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn format_timestamp(us: i64) -> Option<String> {
        Utc.timestamp_micros(us)
            .single()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Timestamp(us) => match Self::format_timestamp(*us) {
                Some(ts) => f.write_str(&ts),
                None => write!(f, "{us}"),
            },
            Value::List(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Null => f.write_str("null"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Str(s) => serializer.serialize_str(s),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::UInt(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Timestamp(us) => match Self::format_timestamp(*us) {
                Some(ts) => serializer.serialize_str(&ts),
                None => serializer.serialize_i64(*us),
            },
            Value::List(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for v in values {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Value::Null => serializer.serialize_unit(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(CompactString::new(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(CompactString::from(s))
    }
}

impl From<CompactString> for Value {
    fn from(s: CompactString) -> Self {
        Value::Str(s)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

/// One key/value pair of a logged record.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpValue {
    pub key: CompactString,
    pub value: Value,
}

impl DumpValue {
    pub fn new(key: &str, value: impl Into<Value>) -> Self {
        Self {
            key: CompactString::new(key),
            value: value.into(),
        }
    }
}

/// Serializes an ordered slice of pairs as one map, keeping insertion order.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a>(pub &'a [DumpValue]);

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for dv in self.0 {
            map.serialize_entry(dv.key.as_str(), &dv.value)?;
        }
        map.end()
    }
}

/// Look up the first value stored under `key`.
pub fn find<'a>(values: &'a [DumpValue], key: &str) -> Option<&'a Value> {
    values.iter().find(|dv| dv.key == key).map(|dv| &dv.value)
}
