//! PostgreSQL frontend protocol (v3) dumper.
//!
//! Decodes client→server traffic:
//!
//! - StartupMessage: `user`/`database` are attached to the connection's dump values
//! - `Q` (simple query): logs `query`
//! - `P` (parse): logs `stmt_name`, `parse_query` and remembers the statement
//! - `B` (bind): logs `portal_name`, `stmt_name`, `parameters` and, when known,
//!   the prepared `query`
//! - `C` (close statement): forgets the statement
//!
//! Everything else is skipped. Server→client traffic is ignored.

use std::collections::HashMap;
use std::fmt::Write;

use tracing::trace;

use super::wire::WireReader;
use super::{ConnectionMetadata, DumpValue, Dumper, Value};
use crate::stream::Direction;

const PROTOCOL_VERSION_3: i32 = 196_608;
const SSL_REQUEST_CODE: i32 = 80_877_103;
const GSSENC_REQUEST_CODE: i32 = 80_877_104;
const CANCEL_REQUEST_CODE: i32 = 80_877_102;

/// Per-connection PostgreSQL state.
#[derive(Debug, Clone, Default)]
pub struct PgState {
    /// Prepared statement name → query text.
    statements: HashMap<String, String>,
}

impl PgState {
    pub fn statement(&self, name: &str) -> Option<&str> {
        self.statements.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PgDumper;

impl Dumper for PgDumper {
    type State = PgState;

    fn name(&self) -> &'static str {
        "pg"
    }

    fn decode(
        &self,
        payload: &[u8],
        direction: Direction,
        meta: &mut ConnectionMetadata<PgState>,
    ) -> Vec<DumpValue> {
        if direction == Direction::ServerToClient || payload.is_empty() {
            return Vec::new();
        }

        // Startup-phase messages have no type byte; their length prefix starts with 0
        if payload[0] == 0 {
            read_startup(payload, meta);
            return Vec::new();
        }

        let mut values = Vec::new();
        let mut reader = WireReader::new(payload);
        while !reader.is_empty() {
            match read_message(&mut reader, meta) {
                Some(mut decoded) => values.append(&mut decoded),
                None => {
                    trace!(remaining = reader.remaining(), "truncated pg message");
                    break;
                }
            }
        }
        values
    }
}

fn read_startup(payload: &[u8], meta: &mut ConnectionMetadata<PgState>) -> Option<()> {
    let mut reader = WireReader::new(payload);
    let len = usize::try_from(reader.i32_be()?).ok()?;
    let body = reader.take(len.checked_sub(4)?)?;
    let mut body = WireReader::new(body);

    match body.i32_be()? {
        PROTOCOL_VERSION_3 => {
            let mut user = None;
            let mut database = None;
            while let Some(key) = body.cstr() {
                if key.is_empty() {
                    break;
                }
                let value = body.cstr()?;
                match key {
                    "user" => user = Some(value),
                    "database" => database = Some(value),
                    _ => {}
                }
            }
            if let Some(user) = user {
                meta.push("username", user);
                // The database defaults to the user name
                meta.push("database", database.unwrap_or(user));
            }
        }
        SSL_REQUEST_CODE | GSSENC_REQUEST_CODE | CANCEL_REQUEST_CODE => {}
        other => trace!(code = other, "unknown pg startup code"),
    }
    Some(())
}

/// Decode one typed message. `None` means the payload ended mid-message.
fn read_message(
    reader: &mut WireReader<'_>,
    meta: &mut ConnectionMetadata<PgState>,
) -> Option<Vec<DumpValue>> {
    let kind = reader.u8()?;
    let len = usize::try_from(reader.i32_be()?).ok()?;
    let body = reader.take(len.checked_sub(4)?)?;
    let mut body = WireReader::new(body);

    let values = match kind {
        b'Q' => vec![DumpValue::new("query", body.cstr()?)],
        b'P' => {
            let stmt_name = body.cstr()?;
            let query = body.cstr()?;
            meta.state
                .statements
                .insert(stmt_name.to_string(), query.to_string());
            vec![
                DumpValue::new("stmt_name", stmt_name),
                DumpValue::new("parse_query", query),
            ]
        }
        b'B' => read_bind(&mut body, &meta.state)?,
        b'C' => {
            if body.u8()? == b'S' {
                let stmt_name = body.cstr()?;
                meta.state.statements.remove(stmt_name);
            }
            Vec::new()
        }
        _ => Vec::new(),
    };
    Some(values)
}

fn read_bind(body: &mut WireReader<'_>, state: &PgState) -> Option<Vec<DumpValue>> {
    let portal_name = body.cstr()?;
    let stmt_name = body.cstr()?;

    let format_count = usize::try_from(body.i16_be()?).ok()?;
    let mut formats = Vec::with_capacity(format_count);
    for _ in 0..format_count {
        formats.push(body.i16_be()?);
    }

    let param_count = usize::try_from(body.i16_be()?).ok()?;
    let mut parameters = Vec::with_capacity(param_count);
    for i in 0..param_count {
        let len = body.i32_be()?;
        if len < 0 {
            parameters.push(Value::Null);
            continue;
        }
        let raw = body.take(len as usize)?;
        // Zero codes: all text; one code: applies to all; otherwise one per parameter
        let format = match formats.len() {
            0 => 0,
            1 => formats[0],
            _ => formats.get(i).copied().unwrap_or(0),
        };
        parameters.push(match format {
            0 => Value::from(String::from_utf8_lossy(raw).into_owned()),
            _ => Value::from(hex_literal(raw)),
        });
    }

    let mut values = vec![
        DumpValue::new("portal_name", portal_name),
        DumpValue::new("stmt_name", stmt_name),
        DumpValue::new("parameters", parameters),
    ];
    if let Some(query) = state.statement(stmt_name) {
        values.push(DumpValue::new("query", query));
    }
    Some(values)
}

fn hex_literal(raw: &[u8]) -> String {
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("\\x");
    for b in raw {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dumper::find;

    fn message(kind: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![kind];
        out.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn startup(params: &[(&str, &str)]) -> Vec<u8> {
        let mut body = PROTOCOL_VERSION_3.to_be_bytes().to_vec();
        for (k, v) in params {
            body.extend_from_slice(k.as_bytes());
            body.push(0);
            body.extend_from_slice(v.as_bytes());
            body.push(0);
        }
        body.push(0);
        let mut out = ((body.len() + 4) as i32).to_be_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    fn bind(portal: &str, stmt: &str, formats: &[i16], params: &[Option<&[u8]>]) -> Vec<u8> {
        let mut body = Vec::new();
        for s in [portal, stmt] {
            body.extend_from_slice(s.as_bytes());
            body.push(0);
        }
        body.extend_from_slice(&(formats.len() as i16).to_be_bytes());
        for f in formats {
            body.extend_from_slice(&f.to_be_bytes());
        }
        body.extend_from_slice(&(params.len() as i16).to_be_bytes());
        for p in params {
            match p {
                Some(raw) => {
                    body.extend_from_slice(&(raw.len() as i32).to_be_bytes());
                    body.extend_from_slice(raw);
                }
                None => body.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        body.extend_from_slice(&0i16.to_be_bytes()); // Result formats
        message(b'B', &body)
    }

    #[test]
    fn test_startup_sets_dump_values() {
        let dumper = PgDumper;
        let mut meta = dumper.new_connection_metadata();
        let payload = startup(&[
            ("user", "alice"),
            ("database", "shop"),
            ("application_name", "psql"),
        ]);

        let values = dumper.decode(&payload, Direction::ClientToServer, &mut meta);
        assert!(values.is_empty());
        assert_eq!(find(&meta.dump_values, "username"), Some(&Value::from("alice")));
        assert_eq!(find(&meta.dump_values, "database"), Some(&Value::from("shop")));
    }

    #[test]
    fn test_startup_database_defaults_to_user() {
        let dumper = PgDumper;
        let mut meta = dumper.new_connection_metadata();
        dumper.decode(&startup(&[("user", "bob")]), Direction::ClientToServer, &mut meta);
        assert_eq!(find(&meta.dump_values, "database"), Some(&Value::from("bob")));
    }

    #[test]
    fn test_ssl_request_logs_nothing() {
        let dumper = PgDumper;
        let mut meta = dumper.new_connection_metadata();
        let mut payload = 8i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&SSL_REQUEST_CODE.to_be_bytes());
        assert!(dumper
            .decode(&payload, Direction::ClientToServer, &mut meta)
            .is_empty());
        assert!(meta.dump_values.is_empty());
    }

    #[test]
    fn test_simple_query() {
        let dumper = PgDumper;
        let mut meta = dumper.new_connection_metadata();
        let payload = message(b'Q', b"SELECT 1\0");
        let values = dumper.decode(&payload, Direction::ClientToServer, &mut meta);
        assert_eq!(values, vec![DumpValue::new("query", "SELECT 1")]);
    }

    #[test]
    fn test_server_to_client_ignored() {
        let dumper = PgDumper;
        let mut meta = dumper.new_connection_metadata();
        let payload = message(b'Q', b"SELECT 1\0");
        assert!(dumper
            .decode(&payload, Direction::ServerToClient, &mut meta)
            .is_empty());
    }

    #[test]
    fn test_parse_then_bind() {
        let dumper = PgDumper;
        let mut meta = dumper.new_connection_metadata();

        let parse = message(b'P', b"s1\0SELECT * FROM t WHERE id = $1 AND tag = $2\0\0\0");
        let values = dumper.decode(&parse, Direction::ClientToServer, &mut meta);
        assert_eq!(find(&values, "stmt_name"), Some(&Value::from("s1")));
        assert_eq!(meta.state.statement("s1"), Some("SELECT * FROM t WHERE id = $1 AND tag = $2"));

        let mut payload = bind("", "s1", &[0, 1], &[Some(&b"42"[..]), Some(&[0xde, 0xad][..])]);
        payload.extend_from_slice(&message(b'E', b"\0\0\0\0\0"));
        payload.extend_from_slice(&message(b'S', b""));
        let values = dumper.decode(&payload, Direction::ClientToServer, &mut meta);

        assert_eq!(find(&values, "portal_name"), Some(&Value::from("")));
        assert_eq!(
            find(&values, "parameters"),
            Some(&Value::List(vec![Value::from("42"), Value::from("\\xdead")]))
        );
        assert_eq!(
            find(&values, "query"),
            Some(&Value::from("SELECT * FROM t WHERE id = $1 AND tag = $2"))
        );
    }

    #[test]
    fn test_bind_null_parameter_and_unknown_statement() {
        let dumper = PgDumper;
        let mut meta = dumper.new_connection_metadata();
        let payload = bind("p", "missing", &[], &[None]);
        let values = dumper.decode(&payload, Direction::Unknown, &mut meta);
        assert_eq!(find(&values, "parameters"), Some(&Value::List(vec![Value::Null])));
        assert_eq!(find(&values, "query"), None);
    }

    #[test]
    fn test_close_forgets_statement() {
        let dumper = PgDumper;
        let mut meta = dumper.new_connection_metadata();
        dumper.decode(&message(b'P', b"s1\0SELECT 1\0\0\0"), Direction::ClientToServer, &mut meta);
        dumper.decode(&message(b'C', b"Ss1\0"), Direction::ClientToServer, &mut meta);
        assert_eq!(meta.state.statement("s1"), None);
    }

    #[test]
    fn test_truncated_message_stops_decoding() {
        let dumper = PgDumper;
        let mut meta = dumper.new_connection_metadata();
        let mut payload = message(b'Q', b"SELECT 1\0");
        let second = message(b'Q', b"SELECT 2\0");
        payload.extend_from_slice(&second[..second.len() - 3]);

        let values = dumper.decode(&payload, Direction::ClientToServer, &mut meta);
        assert_eq!(values, vec![DumpValue::new("query", "SELECT 1")]);
    }
}
