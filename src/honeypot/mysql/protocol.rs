// MySQL wire protocol encoding
// Packet framing, length-encoded values and the packet builders used by
// the impersonator to talk to real clients

use crate::catalog::MYSQL_SERVER_VERSION;
use rand::Rng;

pub const CLIENT_LONG_PASSWORD: u32 = 1 << 0;
pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
pub const CLIENT_PROTOCOL_41: u32 = 1 << 4;
pub const CLIENT_TRANSACTIONS: u32 = 1 << 5;
pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 6;
pub const CLIENT_MULTI_RESULTS: u32 = 1 << 7;
pub const CLIENT_PS_MULTI_RESULTS: u32 = 1 << 8;
pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 9;
pub const CLIENT_CONNECT_ATTRS: u32 = 1 << 10;
pub const CLIENT_PLUGIN_AUTH_LENENC_DATA: u32 = 1 << 11;
pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 13;
pub const CLIENT_SSL: u32 = 1 << 15;
pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
pub const CLIENT_PS_MULTI_STATEMENTS: u32 = 1 << 17;
pub const CLIENT_SESSION_TRACK: u32 = 1 << 19;
pub const CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS: u32 = 1 << 23;
pub const CLIENT_OPTIONAL_RESULTSET_METADATA: u32 = 1 << 24;
pub const CLIENT_QUERY_ATTRIBUTES: u32 = 1 << 27;

/// Capability flags advertised in the handshake. PROTOCOL_41 and
/// SECURE_CONNECTION are the two modern clients refuse to connect without.
pub const CAPABILITY_FLAGS: u32 = CLIENT_LONG_PASSWORD
    | CLIENT_CONNECT_WITH_DB
    | CLIENT_PROTOCOL_41
    | CLIENT_TRANSACTIONS
    | CLIENT_SECURE_CONNECTION
    | CLIENT_MULTI_RESULTS
    | CLIENT_PS_MULTI_RESULTS
    | CLIENT_PLUGIN_AUTH
    | CLIENT_CONNECT_ATTRS
    | CLIENT_PLUGIN_AUTH_LENENC_DATA
    | CLIENT_DEPRECATE_EOF
    | CLIENT_SSL
    | CLIENT_MULTI_STATEMENTS
    | CLIENT_PS_MULTI_STATEMENTS
    | CLIENT_SESSION_TRACK
    | CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS
    | CLIENT_OPTIONAL_RESULTSET_METADATA
    | CLIENT_QUERY_ATTRIBUTES;

pub const STATUS_AUTOCOMMIT: u16 = 0x0002;
pub const CHARSET_UTF8: u16 = 0x21;
pub const CHARSET_BINARY: u16 = 0x3f;
pub const FIELD_TYPE_LONGLONG: u8 = 0x08;
pub const FIELD_TYPE_VAR_STRING: u8 = 0xfd;

const NULL_MARKER: u8 = 0xfb;

/// Frame a payload: 3-byte little-endian length, sequence id, payload.
pub fn packet(sequence_id: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
    out.push(sequence_id);
    out.extend_from_slice(payload);
    out
}

/// Encode a length-encoded integer.
pub fn encode_lenenc_int(value: u64) -> Vec<u8> {
    if value < 251 {
        vec![value as u8]
    } else if value < (1 << 16) {
        let mut out = vec![0xfc];
        out.extend_from_slice(&(value as u16).to_le_bytes());
        out
    } else if value < (1 << 24) {
        let mut out = vec![0xfd];
        out.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
        out
    } else {
        let mut out = vec![0xfe];
        out.extend_from_slice(&value.to_le_bytes());
        out
    }
}

/// Decode a length-encoded integer; returns the value and bytes consumed.
pub fn decode_lenenc_int(buf: &[u8]) -> Option<(u64, usize)> {
    match *buf.first()? {
        n if n < 0xfb => Some((n as u64, 1)),
        0xfc => {
            let bytes: [u8; 2] = buf.get(1..3)?.try_into().ok()?;
            Some((u16::from_le_bytes(bytes) as u64, 3))
        }
        0xfd => {
            let b = buf.get(1..4)?;
            Some((u32::from_le_bytes([b[0], b[1], b[2], 0]) as u64, 4))
        }
        0xfe => {
            let bytes: [u8; 8] = buf.get(1..9)?.try_into().ok()?;
            Some((u64::from_le_bytes(bytes), 9))
        }
        _ => None,
    }
}

/// Encode a length-encoded string; `None` becomes the NULL marker byte.
pub fn encode_lenenc_str(value: Option<&[u8]>) -> Vec<u8> {
    match value {
        None => vec![NULL_MARKER],
        Some(bytes) => {
            let mut out = encode_lenenc_int(bytes.len() as u64);
            out.extend_from_slice(bytes);
            out
        }
    }
}

/// Decode a length-encoded string; returns the value and bytes consumed.
pub fn decode_lenenc_str(buf: &[u8]) -> Option<(Option<Vec<u8>>, usize)> {
    if *buf.first()? == NULL_MARKER {
        return Some((None, 1));
    }
    let (length, consumed) = decode_lenenc_int(buf)?;
    let end = consumed.checked_add(length as usize)?;
    let bytes = buf.get(consumed..end)?;
    Some((Some(bytes.to_vec()), end))
}

/// A fresh 20-byte auth challenge, every byte printable ASCII.
pub fn scramble() -> [u8; 20] {
    let mut rng = rand::thread_rng();
    std::array::from_fn(|_| rng.gen_range(32..=126))
}

/// Build the HandshakeV10 payload sent as packet 0 of every session.
pub fn handshake_payload(connection_id: u32, scramble: &[u8; 20]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(80);

    // protocol version + server version
    payload.push(10);
    payload.extend_from_slice(MYSQL_SERVER_VERSION.as_bytes());
    payload.push(0);

    payload.extend_from_slice(&connection_id.to_le_bytes());

    // first half of the challenge
    payload.extend_from_slice(&scramble[..8]);
    payload.push(0);

    payload.extend_from_slice(&((CAPABILITY_FLAGS & 0xffff) as u16).to_le_bytes());
    payload.push(CHARSET_UTF8 as u8);
    payload.extend_from_slice(&STATUS_AUTOCOMMIT.to_le_bytes());
    payload.extend_from_slice(&(((CAPABILITY_FLAGS >> 16) & 0xffff) as u16).to_le_bytes());

    // auth plugin data length + reserved
    payload.push(0x15);
    payload.extend_from_slice(&[0u8; 10]);

    // rest of the challenge
    payload.extend_from_slice(&scramble[8..]);
    payload.push(0);

    payload.extend_from_slice(b"mysql_native_password");
    payload.push(0);

    payload
}

/// Credentials extracted from a HandshakeResponse41 payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub capabilities: u32,
    pub username: String,
    pub auth_hash: String,
    pub database: String,
}

impl HandshakeResponse {
    fn unknown() -> Self {
        Self {
            capabilities: 0,
            username: "unknown".to_string(),
            auth_hash: String::new(),
            database: String::new(),
        }
    }
}

/// Parse the client's reply to the handshake. Anything malformed falls
/// back to an "unknown" credential record rather than an error; the
/// session always proceeds.
pub fn parse_handshake_response(payload: &[u8]) -> HandshakeResponse {
    if payload.len() < 32 {
        return HandshakeResponse::unknown();
    }

    let capabilities = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);

    // capabilities(4) + max packet(4) + charset(1) + reserved(23)
    let mut pos = 32;

    let Some(username_end) = payload[pos..].iter().position(|&b| b == 0).map(|i| pos + i) else {
        return HandshakeResponse::unknown();
    };
    let username = String::from_utf8_lossy(&payload[pos..username_end]).into_owned();
    pos = username_end + 1;

    let mut auth_hash = String::new();
    if pos < payload.len() {
        let auth_len = payload[pos] as usize;
        pos += 1;
        if auth_len > 0 && pos + auth_len <= payload.len() {
            auth_hash = payload[pos..pos + auth_len]
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect();
            pos += auth_len;
        }
    }

    let mut database = String::new();
    if pos < payload.len() {
        if let Some(db_end) = payload[pos..].iter().position(|&b| b == 0).map(|i| pos + i) {
            database = String::from_utf8_lossy(&payload[pos..db_end]).into_owned();
        }
    }

    HandshakeResponse {
        capabilities,
        username,
        auth_hash,
        database,
    }
}

/// Build a framed OK packet.
///
/// `affected_rows` goes out as the low 3 bytes of a little-endian u32,
/// the way the server this impersonates has always written it.
pub fn ok_packet(sequence_id: u8, message: &str, affected_rows: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(9 + message.len());
    payload.push(0x00);
    payload.extend_from_slice(&affected_rows.to_le_bytes()[..3]);
    payload.extend_from_slice(&[0x00, 0x00]);
    payload.extend_from_slice(&STATUS_AUTOCOMMIT.to_le_bytes());
    payload.extend_from_slice(&[0x00, 0x00]);
    payload.extend_from_slice(message.as_bytes());
    packet(sequence_id, &payload)
}

/// Build a framed ERR packet with SQL state HY000.
pub fn err_packet(sequence_id: u8, error_code: u16, message: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(9 + message.len());
    payload.push(0xff);
    payload.extend_from_slice(&error_code.to_le_bytes());
    payload.push(0x23);
    payload.extend_from_slice(b"HY000");
    payload.extend_from_slice(message.as_bytes());
    packet(sequence_id, &payload)
}

/// EOF packet payload: marker, warning count, status flags.
pub fn eof_payload() -> Vec<u8> {
    let mut payload = vec![0xfe];
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&STATUS_AUTOCOMMIT.to_le_bytes());
    payload
}

/// Metadata for the single column of a synthetic result set
#[derive(Debug, Clone)]
pub struct ColumnDef<'a> {
    pub schema: &'a str,
    pub table: &'a str,
    pub org_table: &'a str,
    pub name: &'a str,
    pub org_name: &'a str,
    pub charset: u16,
    pub length: u32,
    pub field_type: u8,
    pub flags: u16,
    pub decimals: u8,
}

/// Column definition packet payload (Protocol::ColumnDefinition41).
pub fn column_definition(column: &ColumnDef<'_>) -> Vec<u8> {
    let mut payload = Vec::new();

    payload.extend_from_slice(&encode_lenenc_str(Some(b"def")));
    payload.extend_from_slice(&encode_lenenc_str(Some(column.schema.as_bytes())));
    payload.extend_from_slice(&encode_lenenc_str(Some(column.table.as_bytes())));
    payload.extend_from_slice(&encode_lenenc_str(Some(column.org_table.as_bytes())));
    payload.extend_from_slice(&encode_lenenc_str(Some(column.name.as_bytes())));
    payload.extend_from_slice(&encode_lenenc_str(Some(column.org_name.as_bytes())));

    // fixed-length tail
    payload.push(0x0c);
    payload.extend_from_slice(&column.charset.to_le_bytes());
    payload.extend_from_slice(&column.length.to_le_bytes());
    payload.push(column.field_type);
    payload.extend_from_slice(&column.flags.to_le_bytes());
    payload.push(column.decimals);
    payload.extend_from_slice(&[0x00, 0x00]);

    payload
}

/// Assemble a complete single-column result set: column count, column
/// definition, EOF, one packet per row, trailing EOF. Sequence ids
/// increment from `sequence_id` through the whole train. A `None` row
/// value is sent as the NULL marker.
pub fn result_set(sequence_id: u8, column: &ColumnDef<'_>, rows: &[Option<&str>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut seq = sequence_id;

    out.extend_from_slice(&packet(seq, &[0x01]));
    seq = seq.wrapping_add(1);

    out.extend_from_slice(&packet(seq, &column_definition(column)));
    seq = seq.wrapping_add(1);

    out.extend_from_slice(&packet(seq, &eof_payload()));
    seq = seq.wrapping_add(1);

    for row in rows {
        let payload = encode_lenenc_str(row.map(str::as_bytes));
        out.extend_from_slice(&packet(seq, &payload));
        seq = seq.wrapping_add(1);
    }

    out.extend_from_slice(&packet(seq, &eof_payload()));
    out
}
