//! Protocol decoders ("dumpers").
//!
//! A [`Dumper`] receives reassembled payloads together with their direction and
//! the per-connection [`ConnectionMetadata`], and returns the key/value pairs
//! to log for that payload. An empty result means "nothing to log".
//!
//! The variant set is fixed ([`DumperKind`]); the stream pipeline is generic
//! over the trait so each variant gets its own monomorphized consumer loop.

mod hex;
mod mysql;
mod pg;
mod value;
mod wire;

use std::fmt;
use std::str::FromStr;

use crate::stream::Direction;

pub use hex::{hexdump, HexDumper};
pub use mysql::{MysqlDumper, MysqlState};
pub use pg::{PgDumper, PgState};
pub use value::{find, DumpValue, Record, Value};

/// Key under which the connection identifier is stored in dump values.
pub const CONN_ID_KEY: &str = "conn_id";
/// Key under which negotiated MSS values are appended to dump values.
pub const MSS_KEY: &str = "mss";

/// Per-connection state handed to a dumper on every call.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMetadata<S> {
    /// Values re-emitted with every record of this connection (`conn_id`, `mss`, ...).
    pub dump_values: Vec<DumpValue>,
    /// Decoder-private state.
    pub state: S,
}

impl<S> ConnectionMetadata<S> {
    pub fn new(state: S) -> Self {
        Self {
            dump_values: Vec::new(),
            state,
        }
    }

    /// Connection identifier, if one was assigned at SYN time.
    pub fn conn_id(&self) -> Option<&str> {
        find(&self.dump_values, CONN_ID_KEY).and_then(Value::as_str)
    }

    /// Append a value re-emitted with every later record of this connection.
    pub fn push(&mut self, key: &str, value: impl Into<Value>) {
        self.dump_values.push(DumpValue::new(key, value));
    }
}

/// A stateful protocol decoder.
pub trait Dumper: Send + 'static {
    /// Decoder-private per-connection state.
    type State: Default + Send + 'static;

    /// Decoder identifier (e.g., "pg").
    fn name(&self) -> &'static str;

    /// Fresh metadata for a newly seen connection.
    fn new_connection_metadata(&self) -> ConnectionMetadata<Self::State> {
        ConnectionMetadata::new(Self::State::default())
    }

    /// Decode one reassembled payload.
    ///
    /// Malformed input yields an empty vector; decoders never fail the pipeline.
    fn decode(
        &self,
        payload: &[u8],
        direction: Direction,
        meta: &mut ConnectionMetadata<Self::State>,
    ) -> Vec<DumpValue>;
}

/// The available decoder variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumperKind {
    #[default]
    Hex,
    Mysql,
    Pg,
}

impl DumperKind {
    pub const ALL: [DumperKind; 3] = [DumperKind::Hex, DumperKind::Mysql, DumperKind::Pg];

    pub fn name(&self) -> &'static str {
        match self {
            DumperKind::Hex => "hex",
            DumperKind::Mysql => "mysql",
            DumperKind::Pg => "pg",
        }
    }
}

impl fmt::Display for DumperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DumperKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(DumperKind::Hex),
            "mysql" => Ok(DumperKind::Mysql),
            "pg" | "postgres" | "postgresql" => Ok(DumperKind::Pg),
            other => Err(format!(
                "unknown dumper {other:?} (expected one of: hex, mysql, pg)"
            )),
        }
    }
}
