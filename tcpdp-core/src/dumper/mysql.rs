//! MySQL client/server protocol dumper.
//!
//! Client→server packets are decoded into log records:
//!
//! - HandshakeResponse41: `username`/`database` are attached to the connection
//! - `COM_QUERY`: `query`
//! - `COM_INIT_DB`: `database`
//! - `COM_STMT_PREPARE`: `stmt_prepare_query`
//! - `COM_STMT_EXECUTE`: `stmt_id`, `stmt_execute_query`, `parameters`
//!
//! Server→client packets only feed prepared statement bookkeeping
//! (`COM_STMT_PREPARE_OK` assigns a statement id) and never log anything.
//! Once the client requests TLS, the connection is opaque and nothing is decoded.

use std::collections::HashMap;

use tracing::trace;

use super::wire::WireReader;
use super::{ConnectionMetadata, DumpValue, Dumper, Value};
use crate::stream::Direction;

const PACKET_HEADER_LEN: usize = 4;

const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
const CLIENT_SSL: u32 = 0x0000_0800;
const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x0020_0000;

/// Length of an SSLRequest packet payload.
const SSL_REQUEST_LEN: usize = 32;

const COM_INIT_DB: u8 = 0x02;
const COM_QUERY: u8 = 0x03;
const COM_STMT_PREPARE: u8 = 0x16;
const COM_STMT_EXECUTE: u8 = 0x17;
const COM_STMT_CLOSE: u8 = 0x19;

const PREPARE_OK_LEN: usize = 12;

mod field_type {
    pub const DECIMAL: u8 = 0x00;
    pub const TINY: u8 = 0x01;
    pub const SHORT: u8 = 0x02;
    pub const LONG: u8 = 0x03;
    pub const FLOAT: u8 = 0x04;
    pub const DOUBLE: u8 = 0x05;
    pub const NULL: u8 = 0x06;
    pub const TIMESTAMP: u8 = 0x07;
    pub const LONGLONG: u8 = 0x08;
    pub const INT24: u8 = 0x09;
    pub const DATE: u8 = 0x0a;
    pub const TIME: u8 = 0x0b;
    pub const DATETIME: u8 = 0x0c;
    pub const YEAR: u8 = 0x0d;
    pub const VARCHAR: u8 = 0x0f;
    pub const JSON: u8 = 0xf5;
    pub const NEWDECIMAL: u8 = 0xf6;
    pub const ENUM: u8 = 0xf7;
    pub const SET: u8 = 0xf8;
    pub const TINY_BLOB: u8 = 0xf9;
    pub const MEDIUM_BLOB: u8 = 0xfa;
    pub const LONG_BLOB: u8 = 0xfb;
    pub const BLOB: u8 = 0xfc;
    pub const VAR_STRING: u8 = 0xfd;
    pub const STRING: u8 = 0xfe;
}

/// Unsigned flag in the second byte of a parameter type.
const PARAM_UNSIGNED: u8 = 0x80;

#[derive(Debug, Clone, Default)]
struct Statement {
    query: String,
    num_params: u16,
    /// Parameter types from the last execute that bound them.
    param_types: Vec<(u8, u8)>,
}

/// Per-connection MySQL state.
#[derive(Debug, Clone, Default)]
pub struct MysqlState {
    handshake_seen: bool,
    encrypted: bool,
    database: Option<String>,
    /// Query of a COM_STMT_PREPARE awaiting the server's answer.
    pending_prepare: Option<String>,
    statements: HashMap<u32, Statement>,
}

impl MysqlState {
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn statement_query(&self, id: u32) -> Option<&str> {
        self.statements.get(&id).map(|s| s.query.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDumper;

impl Dumper for MysqlDumper {
    type State = MysqlState;

    fn name(&self) -> &'static str {
        "mysql"
    }

    fn decode(
        &self,
        payload: &[u8],
        direction: Direction,
        meta: &mut ConnectionMetadata<MysqlState>,
    ) -> Vec<DumpValue> {
        if meta.state.encrypted {
            return Vec::new();
        }

        let mut values = Vec::new();
        let mut reader = WireReader::new(payload);
        while reader.remaining() >= PACKET_HEADER_LEN {
            let Some((seq_id, body)) = read_packet(&mut reader) else {
                trace!(remaining = reader.remaining(), "truncated mysql packet");
                break;
            };
            match direction {
                Direction::ServerToClient => read_server_packet(body, &mut meta.state),
                Direction::ClientToServer | Direction::Unknown => {
                    if let Some(mut decoded) = read_client_packet(seq_id, body, meta) {
                        values.append(&mut decoded);
                    }
                }
            }
            if meta.state.encrypted {
                break;
            }
        }
        values
    }
}

fn read_packet<'a>(reader: &mut WireReader<'a>) -> Option<(u8, &'a [u8])> {
    let len = reader.u24_le()? as usize;
    let seq_id = reader.u8()?;
    let body = reader.take(len)?;
    Some((seq_id, body))
}

fn read_client_packet(
    seq_id: u8,
    body: &[u8],
    meta: &mut ConnectionMetadata<MysqlState>,
) -> Option<Vec<DumpValue>> {
    if seq_id == 1 && !meta.state.handshake_seen {
        read_handshake_response(body, meta);
        return None;
    }
    if seq_id != 0 {
        // Auth switch / more-data continuation
        return None;
    }

    let mut reader = WireReader::new(body);
    let command = reader.u8()?;
    let rest = reader.rest();
    match command {
        COM_QUERY => Some(vec![DumpValue::new("query", lossy(rest))]),
        COM_INIT_DB => {
            let database = lossy(rest);
            meta.state.database = Some(database.clone());
            Some(vec![DumpValue::new("database", database)])
        }
        COM_STMT_PREPARE => {
            let query = lossy(rest);
            meta.state.pending_prepare = Some(query.clone());
            Some(vec![DumpValue::new("stmt_prepare_query", query)])
        }
        COM_STMT_EXECUTE => read_execute(&mut reader, &mut meta.state),
        COM_STMT_CLOSE => {
            let id = reader.u32_le()?;
            meta.state.statements.remove(&id);
            None
        }
        _ => None,
    }
}

fn read_handshake_response(body: &[u8], meta: &mut ConnectionMetadata<MysqlState>) -> Option<()> {
    let mut reader = WireReader::new(body);
    let capabilities = reader.u32_le()?;
    if capabilities & CLIENT_PROTOCOL_41 == 0 {
        trace!("pre-4.1 mysql handshake response");
        return None;
    }
    if capabilities & CLIENT_SSL != 0 && body.len() == SSL_REQUEST_LEN {
        meta.state.encrypted = true;
        return Some(());
    }
    meta.state.handshake_seen = true;

    reader.skip(4 + 1 + 23)?; // Max packet size, charset, filler
    let username = reader.cstr()?;
    if capabilities & CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
        reader.lenenc_bytes()?;
    } else if capabilities & CLIENT_SECURE_CONNECTION != 0 {
        let len = reader.u8()? as usize;
        reader.skip(len)?;
    } else {
        reader.cstr()?;
    }
    let database = if capabilities & CLIENT_CONNECT_WITH_DB != 0 {
        reader.cstr()
    } else {
        None
    };

    meta.push("username", username);
    if let Some(database) = database {
        meta.state.database = Some(database.to_string());
        meta.push("database", database);
    }
    Some(())
}

fn read_execute(reader: &mut WireReader<'_>, state: &mut MysqlState) -> Option<Vec<DumpValue>> {
    let stmt_id = reader.u32_le()?;
    reader.skip(1 + 4)?; // Flags, iteration count

    let mut values = vec![DumpValue::new("stmt_id", stmt_id)];
    let Some(stmt) = state.statements.get_mut(&stmt_id) else {
        return Some(values);
    };
    values.push(DumpValue::new("stmt_execute_query", stmt.query.as_str()));

    let num_params = stmt.num_params as usize;
    if num_params == 0 {
        return Some(values);
    }
    let null_bitmap = reader.take(num_params.div_ceil(8))?;
    if reader.u8()? == 1 {
        let mut types = Vec::with_capacity(num_params);
        for _ in 0..num_params {
            types.push((reader.u8()?, reader.u8()?));
        }
        stmt.param_types = types;
    }
    if stmt.param_types.len() != num_params {
        return Some(values);
    }

    let mut parameters = Vec::with_capacity(num_params);
    for (i, &(kind, flags)) in stmt.param_types.iter().enumerate() {
        if null_bitmap[i / 8] & (1 << (i % 8)) != 0 {
            parameters.push(Value::Null);
            continue;
        }
        match read_binary_value(reader, kind, flags & PARAM_UNSIGNED != 0) {
            Some(v) => parameters.push(v),
            None => break,
        }
    }
    values.push(DumpValue::new("parameters", parameters));
    Some(values)
}

/// Decode one binary-protocol value; types without a readable rendering become `?`.
fn read_binary_value(reader: &mut WireReader<'_>, kind: u8, unsigned: bool) -> Option<Value> {
    use field_type::*;

    let value = match kind {
        TINY => {
            let v = reader.u8()?;
            if unsigned {
                Value::UInt(v as u64)
            } else {
                Value::Int(v as i8 as i64)
            }
        }
        SHORT | YEAR => {
            let v = reader.u16_le()?;
            if unsigned {
                Value::UInt(v as u64)
            } else {
                Value::Int(v as i16 as i64)
            }
        }
        LONG | INT24 => {
            let v = reader.u32_le()?;
            if unsigned {
                Value::UInt(v as u64)
            } else {
                Value::Int(v as i32 as i64)
            }
        }
        LONGLONG => {
            let v = reader.u64_le()?;
            if unsigned {
                Value::UInt(v)
            } else {
                Value::Int(v as i64)
            }
        }
        FLOAT => Value::Float(f32::from_bits(reader.u32_le()?) as f64),
        DOUBLE => Value::Float(f64::from_bits(reader.u64_le()?)),
        NULL => Value::Null,
        DECIMAL | NEWDECIMAL | VARCHAR | VAR_STRING | STRING | ENUM | SET | JSON | TINY_BLOB
        | MEDIUM_BLOB | LONG_BLOB | BLOB => Value::from(lossy(reader.lenenc_bytes()?)),
        DATE | DATETIME | TIMESTAMP | TIME => {
            let len = reader.u8()? as usize;
            reader.skip(len)?;
            Value::from("?")
        }
        _ => return None,
    };
    Some(value)
}

fn read_server_packet(body: &[u8], state: &mut MysqlState) {
    let Some(query) = state.pending_prepare.take() else {
        return;
    };
    let mut reader = WireReader::new(body);
    match reader.u8() {
        Some(0x00) if body.len() >= PREPARE_OK_LEN => {
            let (Some(stmt_id), Some(_columns), Some(num_params)) =
                (reader.u32_le(), reader.u16_le(), reader.u16_le())
            else {
                return;
            };
            state.statements.insert(
                stmt_id,
                Statement {
                    query,
                    num_params,
                    param_types: Vec::new(),
                },
            );
        }
        // Error packet: the statement was never created
        Some(0xff) => {}
        _ => state.pending_prepare = Some(query),
    }
}

fn lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
